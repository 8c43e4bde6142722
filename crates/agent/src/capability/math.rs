//! Arithmetic capabilities

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Capability, CapabilityError, CapabilityOutput, CapabilityRegistry};

pub const GROUP: &str = "math";

type BinaryOp = fn(f64, f64) -> Result<f64, CapabilityError>;

/// Two-operand arithmetic on JSON numbers
pub struct Arithmetic {
    id: &'static str,
    usage: &'static str,
    op: BinaryOp,
}

impl Arithmetic {
    pub fn add() -> Self {
        Self {
            id: "add",
            usage: "Add two numbers. Usage: {\"a\": 2, \"b\": 3}",
            op: |a, b| Ok(a + b),
        }
    }

    pub fn subtract() -> Self {
        Self {
            id: "subtract",
            usage: "Subtract b from a. Usage: {\"a\": 5, \"b\": 3}",
            op: |a, b| Ok(a - b),
        }
    }

    pub fn multiply() -> Self {
        Self {
            id: "multiply",
            usage: "Multiply two numbers. Usage: {\"a\": 4, \"b\": 6}",
            op: |a, b| Ok(a * b),
        }
    }

    pub fn divide() -> Self {
        Self {
            id: "divide",
            usage: "Divide a by b. Usage: {\"a\": 10, \"b\": 4}",
            op: |a, b| {
                if b == 0.0 {
                    Err(CapabilityError::Provider("division by zero".to_string()))
                } else {
                    Ok(a / b)
                }
            },
        }
    }

    pub fn power() -> Self {
        Self {
            id: "power",
            usage: "Raise a to the power b. Usage: {\"a\": 2, \"b\": 10}",
            op: |a, b| Ok(a.powf(b)),
        }
    }
}

#[async_trait]
impl Capability for Arithmetic {
    fn id(&self) -> &str {
        self.id
    }

    fn group(&self) -> &str {
        GROUP
    }

    fn usage(&self) -> &str {
        self.usage
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["a", "b"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let a = number_arg(&args, "a")?;
        let b = number_arg(&args, "b")?;
        let value = (self.op)(a, b)?;
        finite(value).map(|v| CapabilityOutput::from_text(format_number(v)))
    }
}

pub struct Sqrt;

#[async_trait]
impl Capability for Sqrt {
    fn id(&self) -> &str {
        "sqrt"
    }

    fn group(&self) -> &str {
        GROUP
    }

    fn usage(&self) -> &str {
        "Square root of a. Usage: {\"a\": 49}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "a": { "type": "number" } },
            "required": ["a"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let a = number_arg(&args, "a")?;
        if a < 0.0 {
            return Err(CapabilityError::Provider(
                "square root of a negative number".to_string(),
            ));
        }
        Ok(CapabilityOutput::from_text(format_number(a.sqrt())))
    }
}

/// Character codes of a string
pub struct StringsToCharsToInt;

#[async_trait]
impl Capability for StringsToCharsToInt {
    fn id(&self) -> &str {
        "strings_to_chars_to_int"
    }

    fn group(&self) -> &str {
        GROUP
    }

    fn usage(&self) -> &str {
        "Return the character codes of every character in a string. Usage: {\"string\": \"INDIA\"}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "string": { "type": "string" } },
            "required": ["string"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let text = args
            .get("string")
            .and_then(|s| s.as_str())
            .ok_or_else(|| CapabilityError::InvalidArgs("'string' must be a string".to_string()))?;
        let codes: Vec<u32> = text.chars().map(|c| c as u32).collect();
        Ok(CapabilityOutput::from_json(json!({ "result": codes })))
    }
}

/// Sum of e^x over a list of integers
pub struct IntListToExponentialSum;

#[async_trait]
impl Capability for IntListToExponentialSum {
    fn id(&self) -> &str {
        "int_list_to_exponential_sum"
    }

    fn group(&self) -> &str {
        GROUP
    }

    fn usage(&self) -> &str {
        "Sum of the exponentials of a list of integers. Usage: {\"numbers\": [73, 78, 68, 73, 65]}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "numbers": { "type": "array" } },
            "required": ["numbers"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let numbers = args
            .get("numbers")
            .and_then(|n| n.as_array())
            .ok_or_else(|| CapabilityError::InvalidArgs("'numbers' must be an array".to_string()))?;

        let mut sum = 0.0;
        for n in numbers {
            let x = n.as_f64().ok_or_else(|| {
                CapabilityError::InvalidArgs(format!("'{}' is not a number", n))
            })?;
            sum += x.exp();
        }
        finite(sum).map(|v| CapabilityOutput::from_text(format_number(v)))
    }
}

pub fn register(registry: &mut CapabilityRegistry) {
    registry.register_group(GROUP, "Arithmetic and numeric helpers");
    registry.register(Arithmetic::add());
    registry.register(Arithmetic::subtract());
    registry.register(Arithmetic::multiply());
    registry.register(Arithmetic::divide());
    registry.register(Arithmetic::power());
    registry.register(Sqrt);
    registry.register(StringsToCharsToInt);
    registry.register(IntListToExponentialSum);
}

fn number_arg(args: &Value, key: &str) -> Result<f64, CapabilityError> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CapabilityError::InvalidArgs(format!("'{}' must be a number", key)))
}

fn finite(value: f64) -> Result<f64, CapabilityError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CapabilityError::Provider("result is not a finite number".to_string()))
    }
}

/// Integral values print without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
