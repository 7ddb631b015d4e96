//! Field signatures: ordered parameter descriptors with coercion,
//! default fill-in and variadic tails.
//!
//! Signatures are declared explicitly through the builder methods rather
//! than introspected from callables; the declaration is the schema.

use bitflags::bitflags;

use crate::errors::DataValidationError;
use crate::schema::check::check_type;
use crate::schema::convert::convert_object;
use crate::schema::types::TypeExpr;
use crate::schema::value::Value;

bitflags! {
    /// Behavioral flags persisted with a signature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SignatureFlags: u32 {
        /// Cache the most recent argument tuple on the object instance so
        /// the value can be replayed on visibility queries.
        const PERSIST_IN_RAM = 1;
    }
}

impl Default for SignatureFlags {
    fn default() -> Self {
        SignatureFlags::empty()
    }
}

/// One positional parameter of a field signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureItem {
    pub name: String,
    pub expr: TypeExpr,
    pub is_variadic: bool,
    pub default: Option<Value>,
}

impl SignatureItem {
    /// Validates one argument slot. `None` input means the slot is missing;
    /// the default fills in, a variadic slot stays empty, and anything else
    /// is an error.
    fn validate_value(
        &self,
        value: Option<&Value>,
    ) -> Result<Option<Value>, DataValidationError> {
        let raw = match value {
            Some(value) => value.clone(),
            None if self.is_variadic => return Ok(None),
            None => match &self.default {
                Some(default) => default.clone(),
                None => {
                    return Err(DataValidationError::NoValueProvided(self.name.clone()))
                }
            },
        };

        let converted = convert_object(&self.expr, &raw)?;
        // A bare `Any` still has to carry over the wire, so arguments are
        // held to the hashable universe at call sites.
        match &self.expr {
            TypeExpr::Any(metas) if metas.is_empty() => {
                check_type(&converted, &TypeExpr::Hashable)?
            }
            expr => check_type(&converted, expr)?,
        }
        Ok(Some(converted))
    }
}

/// An ordered list of parameter descriptors plus persisted flags.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSignature {
    pub name: String,
    pub items: Vec<SignatureItem>,
    pub flags: SignatureFlags,
}

impl FieldSignature {
    pub fn new(name: impl Into<String>) -> Self {
        FieldSignature {
            name: name.into(),
            items: Vec::new(),
            flags: SignatureFlags::PERSIST_IN_RAM,
        }
    }

    pub fn param(mut self, name: impl Into<String>, expr: TypeExpr) -> Self {
        self.items.push(SignatureItem {
            name: name.into(),
            expr,
            is_variadic: false,
            default: None,
        });
        self
    }

    pub fn param_default(
        mut self,
        name: impl Into<String>,
        expr: TypeExpr,
        default: Value,
    ) -> Self {
        self.items.push(SignatureItem {
            name: name.into(),
            expr,
            is_variadic: false,
            default: Some(default),
        });
        self
    }

    /// Declares the trailing variadic parameter; every remaining positional
    /// argument validates against its type.
    pub fn variadic(mut self, name: impl Into<String>, expr: TypeExpr) -> Self {
        self.items.push(SignatureItem {
            name: name.into(),
            expr,
            is_variadic: true,
            default: None,
        });
        self
    }

    pub fn with_flags(mut self, flags: SignatureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn persist_in_ram(&self) -> bool {
        self.flags.contains(SignatureFlags::PERSIST_IN_RAM)
    }

    /// Zips the signature against `args` in order, coercing and checking
    /// each slot. Returns the coerced argument list with defaults filled.
    pub fn validate_arguments(
        &self,
        args: &[Value],
    ) -> Result<Vec<Value>, DataValidationError> {
        let mut output = Vec::with_capacity(args.len().max(self.items.len()));
        let mut variadic: Option<&SignatureItem> = None;

        for index in 0..args.len().max(self.items.len()) {
            let value = args.get(index);
            let item = match self.items.get(index) {
                Some(item) => item,
                None => variadic.ok_or(DataValidationError::TooManyArguments {
                    expected: self.items.len(),
                    given: args.len(),
                })?,
            };
            if let Some(converted) = item.validate_value(value)? {
                output.push(converted);
            }
            if item.is_variadic {
                variadic = Some(item);
            }
        }

        Ok(output)
    }
}
