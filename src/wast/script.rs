//! JSON command scripts.
//!
//! A script bundles a `wast2json`-style command list with the binaries it
//! references:
//!
//! ```json
//! {
//!   "bin": { "memory.0.wasm": "AGFzbQEAAAA=" },
//!   "spec": {
//!     "source_filename": "memory.wast",
//!     "commands": [
//!       { "type": "module", "line": 1, "filename": "memory.0.wasm" },
//!       { "type": "assert_return", "line": 2,
//!         "action": { "type": "invoke", "field": "f", "args": [] },
//!         "expected": [{ "type": "i32", "value": "0" }] }
//!     ]
//!   }
//! }
//! ```
//!
//! Binaries are base64 encoded. A script runs against its own fresh
//! [`Harness`]; failed commands are collected into a [`Report`] and only an
//! internal harness error stops the script early.

use super::command::{Action, Expected, Lane, LaneShape};
use crate::config::Config;
use crate::runtime::{CompiledModule, Harness, HarnessError, HostRef, Instance, Value};
use base64::{engine::general_purpose, Engine as _};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const F32_CANONICAL_NAN: u32 = 0x7fc0_0000;
const F32_ARITHMETIC_NAN: u32 = 0x7fc0_0001;
const F64_CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;
const F64_ARITHMETIC_NAN: u64 = 0x7ff8_0000_0000_0001;

/// Errors loading or running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse script: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary {0} not found in script bundle")]
    MissingBinary(String),
    #[error("module ${0} not found")]
    UnknownModule(String),
    #[error("no module has been instantiated")]
    NoCurrentModule,
    #[error("invalid {ty} value {value:?}: {reason}")]
    Value {
        ty: String,
        value: String,
        reason: &'static str,
    },
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error("line {line}: {source}")]
    Fatal {
        line: u32,
        #[source]
        source: HarnessError,
    },
}

#[derive(Debug)]
struct Base64DecodedBytes(Vec<u8>);

impl<'de> Deserialize<'de> for Base64DecodedBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD.decode(s).map_err(de::Error::custom)?;
        Ok(Base64DecodedBytes(decoded))
    }
}

#[derive(Deserialize, Debug)]
struct Spec {
    #[serde(default)]
    source_filename: String,
    commands: Vec<Entry>,
}

/// One command as listed in the script, with the fields every command
/// carries kept alongside the decoded [`Command`].
#[derive(Debug)]
struct Entry {
    kind: String,
    line: u32,
    command: Command,
}

#[derive(Deserialize)]
struct Header {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    line: u32,
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let header = Header::deserialize(&value).map_err(de::Error::custom)?;
        let command = Command::deserialize(&value).map_err(de::Error::custom)?;
        Ok(Entry {
            kind: header.kind,
            line: header.line,
            command,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ModuleType {
    #[default]
    Binary,
    Text,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Command {
    Module {
        #[serde(default)]
        name: Option<String>,
        filename: String,
    },
    Register {
        #[serde(rename = "as")]
        as_name: String,
        #[serde(default)]
        name: Option<String>,
    },
    Action { action: JsonAction },
    AssertReturn {
        action: JsonAction,
        #[serde(default)]
        expected: Vec<JsonValue>,
    },
    AssertTrap { action: JsonAction },
    AssertExhaustion { action: JsonAction },
    AssertException { action: JsonAction },
    AssertMalformed {
        filename: String,
        #[serde(default)]
        module_type: ModuleType,
    },
    AssertInvalid {
        filename: String,
        #[serde(default)]
        module_type: ModuleType,
    },
    AssertUnlinkable {
        filename: String,
        #[serde(default)]
        module_type: ModuleType,
    },
    AssertUninstantiable {
        filename: String,
        #[serde(default)]
        module_type: ModuleType,
    },
    /// Commands this runner does not execute (e.g. thread blocks).
    #[serde(other)]
    Unsupported,
}

impl Command {
    /// Whether this command needs the current module to be usable.
    fn uses_current_module(&self) -> bool {
        match self {
            Command::Register { name, .. } => name.is_none(),
            Command::Action { action, .. }
            | Command::AssertReturn { action, .. }
            | Command::AssertTrap { action, .. }
            | Command::AssertExhaustion { action, .. }
            | Command::AssertException { action, .. } => action.module().is_none(),
            _ => false,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JsonAction {
    Invoke {
        #[serde(default)]
        module: Option<String>,
        field: String,
        #[serde(default)]
        args: Vec<JsonValue>,
    },
    Get {
        #[serde(default)]
        module: Option<String>,
        field: String,
    },
}

impl JsonAction {
    fn module(&self) -> Option<&str> {
        match self {
            JsonAction::Invoke { module, .. } | JsonAction::Get { module, .. } => module.as_deref(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum JsonScalar {
    Scalar(String),
    Lanes(Vec<String>),
}

#[derive(Deserialize, Debug)]
struct JsonValue {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    lane_type: Option<String>,
    #[serde(default)]
    value: Option<JsonScalar>,
}

/// A reference literal: absent (any non-null), `null`, or a host tag.
enum RefLiteral {
    Any,
    Null,
    Tag(u32),
}

impl JsonValue {
    fn error(&self, reason: &'static str) -> ScriptError {
        let value = match &self.value {
            None => String::new(),
            Some(JsonScalar::Scalar(s)) => s.clone(),
            Some(JsonScalar::Lanes(lanes)) => lanes.join(" "),
        };
        ScriptError::Value {
            ty: self.ty.clone(),
            value,
            reason,
        }
    }

    fn scalar(&self) -> Result<&str, ScriptError> {
        match &self.value {
            Some(JsonScalar::Scalar(s)) => Ok(s),
            _ => Err(self.error("expected a single value")),
        }
    }

    fn ref_literal(&self) -> Result<RefLiteral, ScriptError> {
        match &self.value {
            None => Ok(RefLiteral::Any),
            Some(JsonScalar::Scalar(s)) if s == "null" => Ok(RefLiteral::Null),
            Some(JsonScalar::Scalar(s)) => s
                .parse()
                .map(RefLiteral::Tag)
                .map_err(|_| self.error("expected null or a host reference tag")),
            Some(JsonScalar::Lanes(_)) => Err(self.error("expected a single value")),
        }
    }

    fn bits32(&self) -> Result<u32, ScriptError> {
        let s = self.scalar()?;
        s.parse::<u32>()
            .ok()
            .or_else(|| s.parse::<i32>().ok().map(|v| v as u32))
            .ok_or_else(|| self.error("expected a 32-bit integer"))
    }

    fn bits64(&self) -> Result<u64, ScriptError> {
        parse_bits(self.scalar()?).ok_or_else(|| self.error("expected a 64-bit integer"))
    }

    fn v128(&self) -> Result<(LaneShape, &[String]), ScriptError> {
        let shape = self
            .lane_type
            .as_deref()
            .and_then(LaneShape::parse)
            .ok_or_else(|| self.error("missing or unknown lane_type"))?;
        match &self.value {
            Some(JsonScalar::Lanes(lanes)) if lanes.len() == shape.lane_count() => Ok((shape, lanes)),
            _ => Err(self.error("wrong number of lanes")),
        }
    }

    /// Decode this value as an action argument.
    fn to_value(&self) -> Result<Value, ScriptError> {
        match self.ty.as_str() {
            "i32" => Ok(Value::I32(self.bits32()? as i32)),
            "i64" => Ok(Value::I64(self.bits64()? as i64)),
            "f32" => Ok(Value::F32(f32::from_bits(match self.scalar()? {
                "nan:canonical" => F32_CANONICAL_NAN,
                "nan:arithmetic" => F32_ARITHMETIC_NAN,
                _ => self.bits32()?,
            }))),
            "f64" => Ok(Value::F64(f64::from_bits(match self.scalar()? {
                "nan:canonical" => F64_CANONICAL_NAN,
                "nan:arithmetic" => F64_ARITHMETIC_NAN,
                _ => self.bits64()?,
            }))),
            "v128" => {
                let (shape, lanes) = self.v128()?;
                let bits = lanes
                    .iter()
                    .map(|lane| match (lane.as_str(), shape) {
                        ("nan:canonical", LaneShape::F32x4) => Some(u64::from(F32_CANONICAL_NAN)),
                        ("nan:arithmetic", LaneShape::F32x4) => Some(u64::from(F32_ARITHMETIC_NAN)),
                        ("nan:canonical", LaneShape::F64x2) => Some(F64_CANONICAL_NAN),
                        ("nan:arithmetic", LaneShape::F64x2) => Some(F64_ARITHMETIC_NAN),
                        (lane, _) => parse_bits(lane),
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| self.error("invalid lane"))?;
                Ok(Value::V128(shape.join(&bits)))
            }
            "nullref" | "nullfuncref" | "nullexternref" => Ok(Value::Null),
            "externref" | "anyref" | "eqref" | "structref" | "arrayref" | "funcref" | "i31ref" => {
                match (self.ref_literal()?, self.ty.as_str()) {
                    (RefLiteral::Null, _) => Ok(Value::Null),
                    (RefLiteral::Tag(tag), "externref" | "anyref") => Ok(Value::HostRef(HostRef(tag))),
                    (RefLiteral::Tag(tag), "i31ref") => Ok(Value::I31(tag & 0x7fff_ffff)),
                    (RefLiteral::Tag(_), _) => Err(self.error("cannot construct this reference from a tag")),
                    (RefLiteral::Any, _) => Err(self.error("argument needs a value")),
                }
            }
            _ => Err(self.error("unknown value type")),
        }
    }

    /// Decode this value as an expected result.
    fn to_expected(&self) -> Result<Expected, ScriptError> {
        match self.ty.as_str() {
            "f32" | "f64" => match self.scalar()? {
                "nan:canonical" => Ok(Expected::NanCanonical),
                "nan:arithmetic" => Ok(Expected::NanArithmetic),
                "nan:any" => Ok(Expected::NanAny),
                _ => self.to_value().map(Expected::Value),
            },
            "v128" => {
                let (shape, lanes) = self.v128()?;
                let lanes = lanes
                    .iter()
                    .map(|lane| match lane.as_str() {
                        "nan:canonical" | "nan:arithmetic" | "nan:any" if shape.is_float() => Some(Lane::Nan),
                        lane => parse_bits(lane).map(Lane::Bits),
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| self.error("invalid lane"))?;
                Ok(Expected::V128 { shape, lanes })
            }
            "nullref" | "nullfuncref" | "nullexternref" => Ok(Expected::RefNull),
            "externref" | "anyref" | "eqref" | "structref" | "arrayref" | "funcref" | "i31ref" => {
                Ok(match self.ref_literal()? {
                    RefLiteral::Null => Expected::RefNull,
                    RefLiteral::Tag(tag) if matches!(self.ty.as_str(), "externref" | "anyref") => {
                        Expected::Value(Value::HostRef(HostRef(tag)))
                    }
                    RefLiteral::Tag(_) => return Err(self.error("cannot expect this reference by tag")),
                    RefLiteral::Any => match self.ty.as_str() {
                        "externref" => Expected::RefExtern,
                        "funcref" => Expected::RefFunc,
                        "eqref" => Expected::RefEq,
                        "structref" => Expected::RefStruct,
                        "arrayref" => Expected::RefArray,
                        "i31ref" => Expected::RefI31,
                        _ => Expected::RefAny,
                    },
                })
            }
            _ => self.to_value().map(Expected::Value),
        }
    }
}

/// Parse an integer written in unsigned or signed decimal into its bits.
fn parse_bits(s: &str) -> Option<u64> {
    s.parse::<u64>().ok().or_else(|| s.parse::<i64>().ok().map(|v| v as u64))
}

/// One failed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub line: u32,
    pub message: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Outcome of running a script.
#[derive(Debug, Default, Clone)]
pub struct Report {
    pub passed: usize,
    pub skipped: usize,
    pub failures: Vec<CommandFailure>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passed, {} failed", self.passed, self.failures.len())?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// A loaded script bundle.
#[derive(Deserialize, Debug)]
pub struct Script {
    bin: HashMap<String, Base64DecodedBytes>,
    spec: Spec,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Name of the `.wast` file this script was generated from, if recorded.
    pub fn source_filename(&self) -> &str {
        &self.spec.source_filename
    }

    /// Number of commands in the script.
    pub fn len(&self) -> usize {
        self.spec.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spec.commands.is_empty()
    }

    /// Run every command in order against a fresh harness.
    pub fn run(&self, config: &Config) -> Result<Report, ScriptError> {
        let mut runner = Runner {
            script: self,
            harness: Harness::new(config)?,
            current: None,
            named: HashMap::new(),
        };
        let mut report = Report::default();
        let mut module_broken = false;

        for entry in &self.spec.commands {
            let line = entry.line;
            if module_broken && entry.command.uses_current_module() {
                report.skipped += 1;
                continue;
            }

            match runner.execute(entry) {
                Ok(Step::Passed) => report.passed += 1,
                Ok(Step::Skipped) => report.skipped += 1,
                Err(ScriptError::Harness(err)) if err.is_fatal() => {
                    return Err(ScriptError::Fatal { line, source: err });
                }
                Err(err) => {
                    log::debug!("{}:{line}: {err}", self.spec.source_filename);
                    report.failures.push(CommandFailure {
                        line,
                        message: err.to_string(),
                    });
                }
            }

            if let Command::Module { .. } = entry.command {
                module_broken = runner.current.is_none();
            }
        }

        Ok(report)
    }
}

enum Step {
    Passed,
    Skipped,
}

struct Runner<'a> {
    script: &'a Script,
    harness: Harness,
    current: Option<Instance>,
    named: HashMap<String, Instance>,
}

impl Runner<'_> {
    fn binary(&self, filename: &str) -> Result<&[u8], ScriptError> {
        self.script
            .bin
            .get(filename)
            .map(|bytes| bytes.0.as_slice())
            .ok_or_else(|| ScriptError::MissingBinary(filename.to_string()))
    }

    fn load(&mut self, filename: &str) -> Result<CompiledModule, ScriptError> {
        let bytes = self.binary(filename)?.to_vec();
        Ok(self.harness.module(&bytes, true)?)
    }

    fn resolve_instance(&self, name: Option<&str>) -> Result<Instance, ScriptError> {
        match name {
            Some(name) => self
                .named
                .get(name)
                .copied()
                .ok_or_else(|| ScriptError::UnknownModule(name.trim_start_matches('$').to_string())),
            None => self.current.ok_or(ScriptError::NoCurrentModule),
        }
    }

    fn action(&self, action: &JsonAction) -> Result<Action, ScriptError> {
        let instance = self.resolve_instance(action.module())?;
        Ok(match action {
            JsonAction::Invoke { field, args, .. } => {
                let args = args.iter().map(JsonValue::to_value).collect::<Result<Vec<_>, _>>()?;
                Action::invoke(instance, field.clone(), args)
            }
            JsonAction::Get { field, .. } => Action::get(instance, field.clone()),
        })
    }

    fn execute(&mut self, entry: &Entry) -> Result<Step, ScriptError> {
        match &entry.command {
            Command::Module { name, filename, .. } => {
                self.current = None;
                let module = self.load(filename)?;
                let instance = self.harness.instance(&module)?;
                self.current = Some(instance);
                if let Some(name) = name {
                    self.named.insert(name.clone(), instance);
                }
            }
            Command::Register { as_name, name, .. } => {
                let instance = self.resolve_instance(name.as_deref())?;
                self.harness.register(as_name, instance);
            }
            Command::Action { action, .. } => {
                let action = self.action(action)?;
                self.harness.run(&action)?;
            }
            Command::AssertReturn { action, expected, .. } => {
                let action = self.action(action)?;
                let expected = expected
                    .iter()
                    .map(JsonValue::to_expected)
                    .collect::<Result<Vec<_>, _>>()?;
                self.harness.assert_return(&action, &expected)?;
            }
            Command::AssertTrap { action, .. } => {
                let action = self.action(action)?;
                self.harness.assert_trap(&action)?;
            }
            Command::AssertExhaustion { action, .. } => {
                let action = self.action(action)?;
                self.harness.assert_exhaustion(&action)?;
            }
            Command::AssertException { action, .. } => {
                let action = self.action(action)?;
                self.harness.assert_exception(&action)?;
            }
            Command::AssertMalformed {
                filename, module_type, ..
            } => {
                if *module_type == ModuleType::Text {
                    log::debug!("skipping text assert_malformed {filename}");
                    return Ok(Step::Skipped);
                }
                let bytes = self.binary(filename)?.to_vec();
                self.harness.assert_malformed(&bytes)?;
            }
            Command::AssertInvalid {
                filename, module_type, ..
            } => {
                if *module_type == ModuleType::Text {
                    log::debug!("skipping text assert_invalid {filename}");
                    return Ok(Step::Skipped);
                }
                let bytes = self.binary(filename)?.to_vec();
                self.harness.assert_invalid(&bytes)?;
            }
            Command::AssertUnlinkable {
                filename, module_type, ..
            } => {
                if *module_type == ModuleType::Text {
                    return Ok(Step::Skipped);
                }
                let module = self.load(filename)?;
                self.harness.assert_unlinkable(&module)?;
            }
            Command::AssertUninstantiable {
                filename, module_type, ..
            } => {
                if *module_type == ModuleType::Text {
                    return Ok(Step::Skipped);
                }
                let module = self.load(filename)?;
                self.harness.assert_uninstantiable(&module)?;
            }
            Command::Unsupported => {
                log::warn!("line {}: skipping unsupported command {}", entry.line, entry.kind);
                return Ok(Step::Skipped);
            }
        }
        Ok(Step::Passed)
    }
}

/// Load and run the script at `path`.
pub fn run_file(path: impl AsRef<Path>, config: &Config) -> Result<Report, ScriptError> {
    Script::load(path)?.run(config)
}
