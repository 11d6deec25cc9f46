//! Structured error types.
//!
//! Only unbuildable input is an error. Binding mismatches, bad references and
//! infeasible layouts are recovered and logged instead.

use thiserror::Error;

/// The error type returned by the loader and the dataset serializer.
#[derive(Debug, Error)]
pub enum XfaError {
    /// The markup is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Writing serialized output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The packet has no `<template>`.
    #[error("the document has no template packet")]
    MissingTemplate,
    /// The template has no outermost `<subform>`.
    #[error("the template has no root subform")]
    MissingRootSubform,
    /// Anything else that prevents building the node tree.
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl From<quick_xml::events::attributes::AttrError> for XfaError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        XfaError::Xml(quick_xml::Error::from(e))
    }
}

impl From<std::string::FromUtf8Error> for XfaError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        XfaError::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XfaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        assert_eq!(
            XfaError::MissingRootSubform.to_string(),
            "the template has no root subform"
        );
        assert!(XfaError::Malformed("x".into()).to_string().contains('x'));
    }
}
