// Mon Feb 09 2026 - Alex

use crate::error::Error;
use crate::rules::{ExternalValue, ExternalVariable, Rules};

impl Rules {
    fn external_mut(&mut self, identifier: &str) -> Result<&mut ExternalVariable, Error> {
        self.externals
            .iter_mut()
            .find(|e| e.identifier() == identifier)
            .ok_or_else(|| Error::InvalidArgument(format!("no external variable named '{}'", identifier)))
    }

    pub fn define_integer_variable(&mut self, identifier: &str, value: i64) -> Result<(), Error> {
        self.external_mut(identifier)?.value = ExternalValue::Integer(value);
        Ok(())
    }

    pub fn define_boolean_variable(&mut self, identifier: &str, value: bool) -> Result<(), Error> {
        self.external_mut(identifier)?.value = ExternalValue::Boolean(value);
        Ok(())
    }

    pub fn define_float_variable(&mut self, identifier: &str, value: f64) -> Result<(), Error> {
        self.external_mut(identifier)?.value = ExternalValue::Float(value);
        Ok(())
    }

    /// Stores an owned copy; any previously owned value is dropped.
    pub fn define_string_variable(&mut self, identifier: &str, value: &str) -> Result<(), Error> {
        let external = self.external_mut(identifier)?;
        let mut copy = Vec::new();
        copy.try_reserve_exact(value.len())
            .map_err(|_| Error::InsufficientMemory)?;
        copy.extend_from_slice(value.as_bytes());
        external.value = ExternalValue::OwnedString(copy);
        Ok(())
    }

    /// Parses `value` according to the type of the existing definition.
    pub fn define_variable_from_str(&mut self, identifier: &str, value: &str) -> Result<(), Error> {
        let invalid = |kind: &str| {
            Error::InvalidArgument(format!("'{}' is not a valid {} for '{}'", value, kind, identifier))
        };
        match self.external_mut(identifier)?.value().type_name() {
            "integer" => {
                let parsed = value.parse().map_err(|_| invalid("integer"))?;
                self.define_integer_variable(identifier, parsed)
            }
            "boolean" => {
                let parsed = value.parse().map_err(|_| invalid("boolean"))?;
                self.define_boolean_variable(identifier, parsed)
            }
            "float" => {
                let parsed = value.parse().map_err(|_| invalid("float"))?;
                self.define_float_variable(identifier, parsed)
            }
            _ => self.define_string_variable(identifier, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::RulesCompiler;
    use crate::error::Error;
    use crate::rules::ExternalValue;

    #[test]
    fn test_define_variables() {
        let mut rules = RulesCompiler::new()
            .define_integer("count", 1)
            .define_boolean("flag", false)
            .define_float("ratio", 0.1)
            .define_string("name", "default")
            .build()
            .unwrap();

        rules.define_integer_variable("count", 7).unwrap();
        rules.define_boolean_variable("flag", true).unwrap();
        rules.define_float_variable("ratio", 2.5).unwrap();
        rules.define_string_variable("name", "first").unwrap();
        rules.define_string_variable("name", "second").unwrap();

        let values: Vec<_> = rules.externals().iter().map(|e| e.value().clone()).collect();
        assert_eq!(
            values,
            vec![
                ExternalValue::Integer(7),
                ExternalValue::Boolean(true),
                ExternalValue::Float(2.5),
                ExternalValue::OwnedString(b"second".to_vec()),
            ]
        );
    }

    #[test]
    fn test_define_unknown_variable() {
        let mut rules = RulesCompiler::new().build().unwrap();
        assert!(matches!(
            rules.define_integer_variable("missing", 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_define_from_str() {
        let mut rules = RulesCompiler::new()
            .define_integer("count", 1)
            .define_string("name", "x")
            .build()
            .unwrap();

        rules.define_variable_from_str("count", "42").unwrap();
        rules.define_variable_from_str("name", "y").unwrap();
        assert!(rules.define_variable_from_str("count", "many").is_err());
        assert_eq!(rules.externals()[0].value(), &ExternalValue::Integer(42));
    }
}
