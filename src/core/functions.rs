//! Built-in formula functions
//!
//! IF, ABS, ROUND, LOG/LN, LOG10, LOG2, EXP, SQRT, SIN, COS, TAN, POW.
//! Functions only ever see concrete arguments; absence is handled by the
//! evaluator before the call. Mathematically undefined results (log of a
//! non-positive number, square root of a negative one, overflow) are `Absent`.

use crate::error::ExpressionError;
use crate::types::CellValue;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    If,
    Abs,
    Round,
    Ln,
    Log10,
    Log2,
    Exp,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Pow,
}

impl Function {
    /// Look a function up by name (case-insensitive)
    pub fn lookup(name: &str) -> Result<Self, ExpressionError> {
        let function = match name.to_ascii_uppercase().as_str() {
            "IF" => Function::If,
            "ABS" => Function::Abs,
            "ROUND" => Function::Round,
            "LOG" | "LN" => Function::Ln,
            "LOG10" => Function::Log10,
            "LOG2" => Function::Log2,
            "EXP" => Function::Exp,
            "SQRT" => Function::Sqrt,
            "SIN" => Function::Sin,
            "COS" => Function::Cos,
            "TAN" => Function::Tan,
            "POW" | "POWER" => Function::Pow,
            _ => return Err(ExpressionError::UnknownFunction(name.to_string())),
        };
        Ok(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::If => "IF",
            Function::Abs => "ABS",
            Function::Round => "ROUND",
            Function::Ln => "LN",
            Function::Log10 => "LOG10",
            Function::Log2 => "LOG2",
            Function::Exp => "EXP",
            Function::Sqrt => "SQRT",
            Function::Sin => "SIN",
            Function::Cos => "COS",
            Function::Tan => "TAN",
            Function::Pow => "POW",
        }
    }

    /// Inclusive (min, max) argument counts
    fn arity(&self) -> (usize, usize) {
        match self {
            Function::If => (3, 3),
            Function::Round => (1, 2),
            Function::Pow => (2, 2),
            _ => (1, 1),
        }
    }

    pub fn check_arity(&self, got: usize) -> Result<(), ExpressionError> {
        let (min, max) = self.arity();
        if (min..=max).contains(&got) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        Err(ExpressionError::Arity {
            function: self.name().to_string(),
            expected,
            got,
        })
    }

    /// Apply to concrete arguments whose count already passed [`check_arity`](Self::check_arity)
    pub fn apply(&self, args: &[CellValue]) -> Result<CellValue, ExpressionError> {
        match self {
            Function::If => {
                if truthy(&args[0], self.name())? {
                    Ok(args[1].clone())
                } else {
                    Ok(args[2].clone())
                }
            }
            Function::Abs => Ok(CellValue::number(self.number(&args[0])?.abs())),
            Function::Round => {
                let value = self.number(&args[0])?;
                let digits = match args.get(1) {
                    Some(d) => self.number(d)?.trunc() as i32,
                    None => 0,
                };
                Ok(CellValue::number(round_half_away(value, digits)))
            }
            Function::Ln => self.guarded(&args[0], |x| x > 0.0, f64::ln),
            Function::Log10 => self.guarded(&args[0], |x| x > 0.0, f64::log10),
            Function::Log2 => self.guarded(&args[0], |x| x > 0.0, f64::log2),
            Function::Sqrt => self.guarded(&args[0], |x| x >= 0.0, f64::sqrt),
            Function::Exp => self.guarded(&args[0], |_| true, f64::exp),
            Function::Sin => Ok(CellValue::number(self.number(&args[0])?.sin())),
            Function::Cos => Ok(CellValue::number(self.number(&args[0])?.cos())),
            Function::Tan => Ok(CellValue::number(self.number(&args[0])?.tan())),
            Function::Pow => {
                let base = self.number(&args[0])?;
                let exponent = self.number(&args[1])?;
                Ok(undefined_as_absent(self.name(), base.powf(exponent)))
            }
        }
    }

    fn number(&self, value: &CellValue) -> Result<f64, ExpressionError> {
        value
            .as_number()
            .ok_or_else(|| ExpressionError::type_mismatch(self.name(), value.type_name(), "Number"))
    }

    fn guarded(
        &self,
        arg: &CellValue,
        domain: impl Fn(f64) -> bool,
        f: impl Fn(f64) -> f64,
    ) -> Result<CellValue, ExpressionError> {
        let x = self.number(arg)?;
        if !domain(x) {
            debug!(function = self.name(), x, "argument outside domain");
            return Ok(CellValue::Absent);
        }
        Ok(undefined_as_absent(self.name(), f(x)))
    }
}

fn undefined_as_absent(function: &str, result: f64) -> CellValue {
    if !result.is_finite() {
        debug!(function, result, "non-finite result");
    }
    CellValue::number(result)
}

/// Condition value of IF: numbers are true when non-zero
pub fn truthy(value: &CellValue, context: &str) -> Result<bool, ExpressionError> {
    match value {
        CellValue::Boolean(b) => Ok(*b),
        CellValue::Number(n) => Ok(*n != 0.0),
        other => Err(ExpressionError::type_mismatch(
            context.to_string(),
            other.type_name(),
            "Boolean",
        )),
    }
}

/// ROUND(value, digits), halves rounded away from zero.
///
/// When scaling by `10^digits` overflows the value already has no digits
/// past that precision and is returned unchanged.
fn round_half_away(value: f64, digits: i32) -> f64 {
    let multiplier = 10_f64.powi(digits);
    if multiplier == 0.0 {
        return 0.0_f64.copysign(value);
    }
    let scaled = value * multiplier;
    if !multiplier.is_finite() || !scaled.is_finite() {
        return value;
    }
    scaled.round() / multiplier
}
