//! Configuration validation utilities for the dispatch system.
//!
//! This module provides a small type-safe framework for validating the TOML
//! configuration blobs handed to pluggable backends. It supports nested
//! schemas, custom validators, and detailed error reporting.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Represents the type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	/// A string value.
	String,
	/// An integer value with optional minimum and maximum bounds.
	Integer {
		/// Minimum allowed value (inclusive).
		min: Option<i64>,
		/// Maximum allowed value (inclusive).
		max: Option<i64>,
	},
	/// A boolean value.
	Boolean,
	/// An array of values, all of the same type.
	Array(Box<FieldType>),
	/// A nested table with its own schema.
	Table(Schema),
}

/// Type alias for field validator functions.
///
/// Validators are custom functions that can perform additional validation
/// beyond type checking. They receive a TOML value and return an error
/// message if validation fails.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// Represents a field in a configuration schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	/// Creates a new field with the given name and type.
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}
}

/// Defines a validation schema for TOML configuration.
///
/// A schema consists of required fields that must be present and optional
/// fields that may be present. Schemas can be nested to validate
/// hierarchical configurations.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	/// Creates a new schema with required and optional fields.
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "<root>".to_string(),
				expected: "table".to_string(),
				actual: type_name(config).to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			Self::validate_field(field, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				Self::validate_field(field, value)?;
			}
		}

		Ok(())
	}

	fn validate_field(field: &Field, value: &toml::Value) -> Result<(), ValidationError> {
		Self::validate_type(&field.name, &field.field_type, value)?;

		if let Some(validator) = &field.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: field.name.clone(),
				message,
			})?;
		}

		Ok(())
	}

	fn validate_type(
		name: &str,
		field_type: &FieldType,
		value: &toml::Value,
	) -> Result<(), ValidationError> {
		let mismatch = |expected: &str| ValidationError::TypeMismatch {
			field: name.to_string(),
			expected: expected.to_string(),
			actual: type_name(value).to_string(),
		};

		match field_type {
			FieldType::String => {
				value.as_str().ok_or_else(|| mismatch("string"))?;
			}
			FieldType::Integer { min, max } => {
				let n = value.as_integer().ok_or_else(|| mismatch("integer"))?;
				if let Some(min) = min {
					if n < *min {
						return Err(ValidationError::InvalidValue {
							field: name.to_string(),
							message: format!("must be >= {}", min),
						});
					}
				}
				if let Some(max) = max {
					if n > *max {
						return Err(ValidationError::InvalidValue {
							field: name.to_string(),
							message: format!("must be <= {}", max),
						});
					}
				}
			}
			FieldType::Boolean => {
				value.as_bool().ok_or_else(|| mismatch("boolean"))?;
			}
			FieldType::Array(inner) => {
				let items = value.as_array().ok_or_else(|| mismatch("array"))?;
				for item in items {
					Self::validate_type(name, inner, item)?;
				}
			}
			FieldType::Table(schema) => {
				value.as_table().ok_or_else(|| mismatch("table"))?;
				schema.validate(value)?;
			}
		}

		Ok(())
	}
}

fn type_name(value: &toml::Value) -> &'static str {
	match value {
		toml::Value::String(_) => "string",
		toml::Value::Integer(_) => "integer",
		toml::Value::Float(_) => "float",
		toml::Value::Boolean(_) => "boolean",
		toml::Value::Datetime(_) => "datetime",
		toml::Value::Array(_) => "array",
		toml::Value::Table(_) => "table",
	}
}

/// Trait implemented by each pluggable backend to expose its
/// configuration schema for validation before construction.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
