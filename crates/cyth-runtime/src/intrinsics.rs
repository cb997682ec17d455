//! Host functions an artifact may import from the `env` module.
//!
//! Intrinsics are bound against whatever numeric signature the artifact
//! declares, since the compiler picks parameter types from the program's own
//! `import "env"` declarations. Every numeric argument is widened to `f64`
//! and results are narrowed back to the declared type.

use std::collections::HashSet;

use anyhow::{Result, anyhow, bail};
use rand::Rng;
use wasmtime::{Caller, Extern, ExternType, Func, FuncType, Linker, Module, Val, ValType};

use crate::error::RuntimeError;
use crate::run_state::RunState;
use crate::runner::RunnerEvent;
use crate::surface::Rgb;

/// Bumped whenever an entry is added, removed, or changes meaning.
pub const BRIDGE_VERSION: u32 = 1;

pub const IMPORT_MODULE: &str = "env";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectClass {
    /// Returns a value, touches nothing else.
    Pure,
    /// Emits output, possibly reading a string handle back out of the sandbox.
    HostIo,
    /// Mutates the drawing surface. Last write wins.
    Presentation,
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Log,
    Millis,
    Random,
    Unary(fn(f64) -> f64),
    Binary(fn(f64, f64) -> f64),
    Size,
    Fill,
    Clear,
    Rect,
    Circle,
}

#[derive(Debug, Clone, Copy)]
pub struct Intrinsic {
    pub name: &'static str,
    /// Exact arity; for `log` the maximum.
    pub params: usize,
    pub returns_value: bool,
    pub effect: EffectClass,
    operation: Operation,
}

impl Intrinsic {
    const fn pure(name: &'static str, params: usize, operation: Operation) -> Self {
        Self {
            name,
            params,
            returns_value: true,
            effect: EffectClass::Pure,
            operation,
        }
    }

    const fn presentation(name: &'static str, params: usize, operation: Operation) -> Self {
        Self {
            name,
            params,
            returns_value: false,
            effect: EffectClass::Presentation,
            operation,
        }
    }
}

const LOG: Intrinsic = Intrinsic {
    name: "log",
    params: 1,
    returns_value: false,
    effect: EffectClass::HostIo,
    operation: Operation::Log,
};

pub static INTRINSICS: &[Intrinsic] = &[
    LOG,
    Intrinsic::pure("millis", 0, Operation::Millis),
    Intrinsic::pure("random", 0, Operation::Random),
    Intrinsic::pure("sqrt", 1, Operation::Unary(f64::sqrt)),
    Intrinsic::pure("cos", 1, Operation::Unary(f64::cos)),
    Intrinsic::pure("sin", 1, Operation::Unary(f64::sin)),
    Intrinsic::pure("tan", 1, Operation::Unary(f64::tan)),
    Intrinsic::pure("atan", 1, Operation::Unary(f64::atan)),
    Intrinsic::pure("atan2", 2, Operation::Binary(f64::atan2)),
    Intrinsic::pure("pow", 2, Operation::Binary(f64::powf)),
    Intrinsic::presentation("size", 2, Operation::Size),
    Intrinsic::presentation("fill", 3, Operation::Fill),
    Intrinsic::presentation("clear", 0, Operation::Clear),
    Intrinsic::presentation("rect", 4, Operation::Rect),
    Intrinsic::presentation("circle", 3, Operation::Circle),
];

/// `log`, plus the overload spellings `log<int>` and `log(int)`.
fn is_log_name(name: &str) -> bool {
    name == "log"
        || (name.starts_with("log<") && name.ends_with('>'))
        || (name.starts_with("log(") && name.ends_with(')'))
}

pub fn lookup(name: &str) -> Option<&'static Intrinsic> {
    let name = if is_log_name(name) { LOG.name } else { name };
    INTRINSICS.iter().find(|intrinsic| intrinsic.name == name)
}

fn is_numeric(ty: &ValType) -> bool {
    matches!(ty, ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
}

fn number(val: &Val) -> Option<f64> {
    match val {
        Val::I32(v) => Some(f64::from(*v)),
        Val::I64(v) => Some(*v as f64),
        Val::F32(bits) => Some(f64::from(f32::from_bits(*bits))),
        Val::F64(bits) => Some(f64::from_bits(*bits)),
        _ => None,
    }
}

/// Integers truncate toward zero and saturate; NaN becomes 0.
fn to_val(value: f64, ty: &ValType) -> Val {
    match ty {
        ValType::I32 => Val::I32(value as i32),
        ValType::I64 => Val::I64(value as i64),
        ValType::F32 => Val::F32((value as f32).to_bits()),
        _ => Val::F64(value.to_bits()),
    }
}

/// Build call arguments for an export, or `None` if it takes a non-numeric
/// parameter the host cannot supply.
pub(crate) fn numeric_args(ty: &FuncType, args: &[f64]) -> Option<Vec<Val>> {
    ty.params()
        .enumerate()
        .map(|(i, param)| {
            is_numeric(&param).then(|| to_val(args.get(i).copied().unwrap_or(0.0), &param))
        })
        .collect()
}

/// Format a number the way the playground console always has: integral
/// values without a fractional part, `NaN`, and `Infinity`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".into()
    } else if value.is_infinite() {
        String::from(if value > 0.0 { "Infinity" } else { "-Infinity" })
    } else if value == 0.0 {
        "0".into()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

impl Intrinsic {
    fn check_signature(&self, ty: &FuncType) -> Result<(), String> {
        let params: Vec<ValType> = ty.params().collect();
        let results: Vec<ValType> = ty.results().collect();

        if let Operation::Log = self.operation {
            if !results.is_empty() {
                return Err("log returns nothing".into());
            }
            return match params.as_slice() {
                [] => Ok(()),
                [param] if is_numeric(param) || matches!(param, ValType::Ref(_)) => Ok(()),
                [_] => Err("log takes a number or a string handle".into()),
                _ => Err(format!("log takes at most one argument, got {}", params.len())),
            };
        }

        if params.len() != self.params {
            return Err(format!(
                "expected {} parameters, got {}",
                self.params,
                params.len()
            ));
        }
        if !params.iter().all(is_numeric) {
            return Err("parameters must be numeric".into());
        }
        match (self.returns_value, results.as_slice()) {
            (true, [result]) if is_numeric(result) => Ok(()),
            (false, []) => Ok(()),
            (true, _) => Err("expected a single numeric result".into()),
            (false, _) => Err("expected no results".into()),
        }
    }

    /// Run the intrinsic on already-widened arguments and return its value
    /// (0 for intrinsics without one).
    pub fn evaluate(&self, state: &mut RunState, args: &[f64]) -> f64 {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0.0);

        match self.operation {
            // Needs the caller to reach string accessors; see `log`.
            Operation::Log => 0.0,
            Operation::Millis => state.millis(),
            Operation::Random => state.rng.gen_range(0.0..1.0),
            Operation::Unary(f) => f(arg(0)),
            Operation::Binary(f) => f(arg(0), arg(1)),
            Operation::Size => {
                state
                    .surface
                    .resize(arg(0).max(0.0) as u32, arg(1).max(0.0) as u32);
                state.animation_requested = true;
                0.0
            }
            Operation::Fill => {
                let channel = |v: f64| v.clamp(0.0, 255.0) as u8;
                state
                    .surface
                    .set_fill(Rgb::new(channel(arg(0)), channel(arg(1)), channel(arg(2))));
                0.0
            }
            Operation::Clear => {
                state.surface.clear();
                0.0
            }
            Operation::Rect => {
                let (mut x, mut y, mut width, mut height) = (arg(0), arg(1), arg(2), arg(3));
                if width < 0.0 {
                    x += width;
                    width = -width;
                }
                if height < 0.0 {
                    y += height;
                    height = -height;
                }
                state.surface.fill_rect(x, y, width, height);
                0.0
            }
            Operation::Circle => {
                state.surface.fill_circle(arg(0), arg(1), arg(2).max(0.0));
                0.0
            }
        }
    }

    fn call(
        &self,
        caller: &mut Caller<'_, RunState>,
        params: &[Val],
        results: &mut [Val],
        result_ty: Option<&ValType>,
    ) -> Result<()> {
        if let Operation::Log = self.operation {
            return log(caller, params.first());
        }

        let args: Vec<f64> = params
            .iter()
            .map(|val| number(val).unwrap_or(f64::NAN))
            .collect();
        let value = self.evaluate(caller.data_mut(), &args);

        if let (Some(slot), Some(ty)) = (results.first_mut(), result_ty) {
            *slot = to_val(value, ty);
        }
        Ok(())
    }
}

fn log(caller: &mut Caller<'_, RunState>, arg: Option<&Val>) -> Result<()> {
    let text = match arg {
        None => String::new(),
        Some(Val::I32(v)) => v.to_string(),
        Some(Val::I64(v)) => v.to_string(),
        Some(val @ (Val::F32(_) | Val::F64(_))) => format_number(number(val).unwrap_or(f64::NAN)),
        Some(handle) => read_string(caller, handle)?,
    };
    caller.data().emit(RunnerEvent::Print(text));
    Ok(())
}

fn accessor(caller: &mut Caller<'_, RunState>, name: &str) -> Result<Func> {
    caller
        .get_export(name)
        .and_then(Extern::into_func)
        .ok_or_else(|| anyhow!("string handle passed but artifact does not export `{name}`"))
}

/// Copy a string out of the sandbox through the exported accessor pair.
fn read_string(caller: &mut Caller<'_, RunState>, handle: &Val) -> Result<String> {
    let length_name = caller.data().string_length_export.clone();
    let at_name = caller.data().string_at_export.clone();
    let length = accessor(caller, &length_name)?;
    let at = accessor(caller, &at_name)?;

    let mut out = [Val::I32(0)];
    length.call(&mut *caller, std::slice::from_ref(handle), &mut out)?;
    let len = number(&out[0]).ok_or_else(|| anyhow!("`{length_name}` returned a non-number"))?;
    if len < 0.0 || len.fract() != 0.0 {
        bail!("string handle reported invalid length {len}");
    }

    let index_ty = at
        .ty(&*caller)
        .params()
        .nth(1)
        .ok_or_else(|| anyhow!("`{at_name}` must take (handle, index)"))?;

    let len = len as usize;
    let mut bytes = Vec::with_capacity(len.min(4096));
    for index in 0..len {
        let args = [handle.clone(), to_val(index as f64, &index_ty)];
        at.call(&mut *caller, &args, &mut out)?;
        let byte = number(&out[0]).ok_or_else(|| anyhow!("`{at_name}` returned a non-number"))?;
        if !(0.0..=255.0).contains(&byte) {
            bail!("`{at_name}` returned {byte} at index {index}, outside the byte range");
        }
        bytes.push(byte as u8);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Define every import of `module` in `linker`, or explain why the artifact
/// cannot be satisfied.
pub fn link(linker: &mut Linker<RunState>, module: &Module) -> Result<(), RuntimeError> {
    let mut defined = HashSet::new();

    for import in module.imports() {
        let (module_name, name) = (import.module(), import.name());

        if module_name != IMPORT_MODULE {
            return Err(RuntimeError::Instantiation(format!(
                "import {module_name}.{name} is outside the `{IMPORT_MODULE}` module"
            )));
        }
        let ExternType::Func(ty) = import.ty() else {
            return Err(RuntimeError::Instantiation(format!(
                "import {module_name}.{name} is not a function"
            )));
        };
        if !defined.insert(name.to_string()) {
            // A second import of the same name must match the first; the
            // instantiation type check reports it if it does not.
            continue;
        }

        let intrinsic = lookup(name).ok_or_else(|| {
            RuntimeError::Instantiation(format!("import {module_name}.{name} has no matching intrinsic"))
        })?;
        intrinsic.check_signature(&ty).map_err(|reason| {
            RuntimeError::Instantiation(format!("import {module_name}.{name}: {reason}"))
        })?;

        let result_ty = ty.results().next();
        linker
            .func_new(IMPORT_MODULE, name, ty, move |mut caller, params, results| {
                intrinsic.call(&mut caller, params, results, result_ty.as_ref())
            })
            .map_err(|e| RuntimeError::Instantiation(format!("{module_name}.{name}: {e}")))?;

        tracing::trace!(intrinsic = name, effect = ?intrinsic.effect, "Bound intrinsic");
    }

    Ok(())
}
