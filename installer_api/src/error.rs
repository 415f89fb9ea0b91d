use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Serialize};
use strum_macros::IntoStaticStr;

/// The gadget description or an input argument was invalid before any disk
/// I/O was attempted.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum BadInputError {
    #[error("Gadget root '{path}' is empty or does not exist")]
    EmptyGadgetRoot { path: String },
    #[error("Model does not declare the required role '{role}'")]
    MissingRole { role: &'static str },
    #[error("Refusing to install: system does not support modes (pre-modes system)")]
    PreModesSystem,
}

/// The declarative gadget description was malformed or internally
/// inconsistent.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutInvalidError {
    #[error("Failed to read gadget description at '{path}'")]
    ReadGadgetYaml { path: String },
    #[error("Failed to parse gadget description at '{path}'")]
    ParseGadgetYaml { path: String },
    #[error("Volume '{volume}' declares role '{role}' more than once")]
    DuplicateRole { volume: String, role: String },
    #[error("Structure '{name}' in volume '{volume}' overlaps the structure before it")]
    OverlappingStructures { volume: String, name: String },
    #[error("Structure '{name}' declares a filesystem-label without a filesystem, or vice versa")]
    FilesystemLabelMismatch { name: String },
    #[error("system-data structure '{name}' with size 0 must be the last non-mbr structure")]
    GrowNotLast { name: String },
    #[error("Laid out volume has no structure with role 'system-seed'")]
    RoleNotPresent,
}

/// The declared layout could not be reconciled with the disk actually
/// probed.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IncompatibleLayoutError {
    #[error("Partition '{role}' exists at offset {actual_offset} but layout declares {expected_offset}")]
    OffsetMismatch {
        role: String,
        actual_offset: u64,
        expected_offset: u64,
    },
    #[error("Partition '{role}' exists with size {actual_size} but layout declares {expected_size}")]
    SizeMismatch {
        role: String,
        actual_size: u64,
        expected_size: u64,
    },
    #[error("Factory reset requires structural partition '{role}' to already exist")]
    MissingStructuralPartition { role: String },
    #[error("Partition table schema is neither gpt nor mbr")]
    UnsupportedSchema,
    #[error("Refusing to delete partition at index {index}: it is at or before system-seed")]
    UnsafeDeletion { index: u32 },
}

/// An expected device node or symlink could not be resolved.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceNotFoundError {
    #[error("No disk found containing partition '{partition}'")]
    NoContainingDisk { partition: String },
    #[error("No symlink found at '{path}' for partition label '{label}'")]
    NoPartlabelSymlink { path: String, label: String },
    #[error("Device '{device}' does not exist")]
    MissingDevice { device: String },
}

/// An external tool invocation failed.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolFailedError {
    #[error("Tool '{tool}' exited with status {exit_code}: {stderr}")]
    NonZeroExit {
        tool: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("Tool '{tool}' could not be started: {reason}")]
    SpawnFailed { tool: String, reason: String },
    #[error("Key generation failed: entropy source unavailable")]
    KeyGenerationFailed,
    #[error("LUKS format of '{device}' failed")]
    LuksFormatFailed { device: String },
    #[error("LUKS open of '{device}' as '{mapper_name}' failed")]
    LuksOpenFailed {
        device: String,
        mapper_name: String,
    },
}

/// A bounded wait elapsed before its condition was satisfied.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutError {
    #[error("Timed out after {seconds}s waiting for device nodes to appear: {missing:?}")]
    NodesNotPresent { seconds: u64, missing: Vec<String> },
    #[error("Timed out after {seconds}s waiting for udev to settle")]
    SettleTimedOut { seconds: u64 },
}

/// The requested encryption type is not implemented by this engine.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum UnsupportedEncryptionError {
    #[error("Encryption type '{requested}' is not supported; only 'luks' is implemented")]
    UnknownType { requested: String },
}

/// A filesystem read/write or (de)serialisation failure.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IoErrorKind {
    #[error("Failed to read '{path}'")]
    Read { path: String },
    #[error("Failed to write '{path}'")]
    Write { path: String },
    #[error("Failed to serialize {what}")]
    Serialize { what: String },
    #[error("Failed to deserialize {what}")]
    Deserialize { what: String },
}

/// Each variant corresponds to one of the error-taxonomy categories the
/// engine commits to at its public boundary.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    #[error(transparent)]
    BadInput(#[from] BadInputError),

    #[error(transparent)]
    LayoutInvalid(#[from] LayoutInvalidError),

    #[error(transparent)]
    IncompatibleLayout(#[from] IncompatibleLayoutError),

    #[error(transparent)]
    DeviceNotFound(#[from] DeviceNotFoundError),

    #[error(transparent)]
    ToolFailed(#[from] ToolFailedError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    UnsupportedEncryption(#[from] UnsupportedEncryptionError),

    #[error(transparent)]
    IoError(#[from] IoErrorKind),
}

#[derive(Debug)]
struct EngineErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

/// The engine's single error type. Carries a category (`ErrorKind`), the
/// call site that raised it, and an optional chained source.
pub struct EngineError(Box<EngineErrorInner>);

impl EngineError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        EngineError(Box::new(EngineErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    pub fn unstructured(self, context: impl Into<Cow<'static, str>>) -> anyhow::Error {
        match self.0.source {
            Some(source) => source.context(self.0.kind).context(context.into()),
            None => anyhow::Error::from(self.0.kind).context(context.into()),
        }
    }
}

/// Attach a `kind` to a fallible value, turning it into a structured
/// `EngineError`.
pub trait ReportError<T, K> {
    fn structured(self, kind: K) -> Result<T, EngineError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, EngineError> {
        match self {
            Some(t) => Ok(t),
            None => Err(EngineError(Box::new(EngineErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: None,
                context: Vec::new(),
            }))),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, EngineError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(EngineError(Box::new(EngineErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

/// Attach human-readable context to an already-structured error.
pub trait EngineResultExt<T> {
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, EngineError>;
    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error>;
}

impl<T> EngineResultExt<T> for Result<T, EngineError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, EngineError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }

    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error> {
        self.map_err(|e| e.unstructured(context))
    }
}

impl Serialize for EngineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("engine-error", 4)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_json::Value;

    use super::*;

    #[test]
    fn test_error_serialize() {
        let e = EngineError::new(BadInputError::PreModesSystem);
        let value = serde_json::to_value(&e).unwrap();
        match value {
            Value::Object(m) => {
                assert_eq!(m.len(), 4);
                assert_eq!(m["category"], Value::String("bad-input".into()));
                assert!(m["cause"].is_null());
                match m["location"] {
                    Value::String(ref s) => assert!(s.contains("error.rs:")),
                    _ => panic!("location isn't string"),
                }
            }
            _ => panic!("value isn't object"),
        }
    }

    #[test]
    fn test_error_debug_chains_context_and_source() {
        let error = Err::<(), _>(anyhow::anyhow!("z"))
            .context("x\ny")
            .structured(ToolFailedError::KeyGenerationFailed)
            .unwrap_err();
        assert_eq!(
            format!("{:?}", error),
            format!(
                "Key generation failed: entropy source unavailable at {}:{}\n\nCaused by:\n    0: x\n       y\n    1: z\n",
                error.0.location.file(),
                error.0.location.line(),
            ),
        );
    }

    #[test]
    fn test_message_appends_context() {
        let error = EngineError::new(BadInputError::PreModesSystem).message("while installing");
        let err = error.unwrap_err();
        assert!(format!("{:?}", err).contains("while installing"));
    }
}
