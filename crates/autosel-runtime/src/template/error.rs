use autosel_common::element::ElemType;
use core::fmt::Display;

/// An error that occurred while rendering a kernel template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{{...}}` block could not be parsed.
    Syntax {
        /// Byte offset of the block in the template source.
        position: usize,
        /// What went wrong.
        message: String,
    },
    /// A call to a generator that is not registered.
    UnknownGenerator(String),
    /// A generator was called with arguments it cannot accept.
    InvalidArgs {
        /// Name of the generator.
        generator: String,
        /// What went wrong.
        message: String,
    },
    /// Two hooks were registered under the same placeholder token.
    DuplicateHook(String),
    /// A hook was still pending when the final source was assembled, or a
    /// placeholder token had no registered resolver.
    UnresolvedHook(String),
    /// The template does not support the requested element type.
    UnsupportedElemType(ElemType),
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TemplateError::Syntax { position, message } => {
                write!(f, "template syntax error at byte {position}: {message}")
            }
            TemplateError::UnknownGenerator(name) => {
                write!(f, "unknown template generator '{name}'")
            }
            TemplateError::InvalidArgs { generator, message } => {
                write!(f, "invalid arguments for generator '{generator}': {message}")
            }
            TemplateError::DuplicateHook(token) => {
                write!(f, "hook '{token}' registered twice")
            }
            TemplateError::UnresolvedHook(token) => {
                write!(f, "hook '{token}' was never finalized")
            }
            TemplateError::UnsupportedElemType(elem) => {
                write!(f, "element type {elem} is not supported by this template")
            }
        }
    }
}

impl core::error::Error for TemplateError {}
