//! Type-string parsing.
//!
//! Schema metadata declares field and argument types in the compact wire
//! syntax (`User`, `User!`, `[User]`, `[User!]!`). A [`TypeRef`] is the
//! parsed form: the bare name plus nullability and list flags.

/// A parsed type reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRef {
    /// The bare type name, with list/non-null markers stripped.
    pub name: String,
    /// The outermost position is non-null (`T!` or `[T]!`).
    pub non_null: bool,
    /// The type is a list (`[T]`).
    pub list: bool,
    /// The list elements are non-null (`[T!]`).
    pub non_null_list: bool,
}

impl TypeRef {
    /// Parses a type string.
    pub fn parse(type_str: &str) -> Self {
        let mut rest = type_str.trim();
        let mut non_null = false;
        if let Some(stripped) = rest.strip_suffix('!') {
            non_null = true;
            rest = stripped;
        }

        let mut list = false;
        let mut non_null_list = false;
        if let Some(inner) = rest
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
        {
            list = true;
            rest = inner.trim();
            if let Some(stripped) = rest.strip_suffix('!') {
                non_null_list = true;
                rest = stripped;
            }
        }

        Self {
            name: rest.to_string(),
            non_null,
            list,
            non_null_list,
        }
    }

    /// Strips all markers from a type string, returning the bare name.
    pub fn normalize(type_str: &str) -> String {
        Self::parse(type_str).name
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.list {
            write!(f, "[{}", self.name)?;
            if self.non_null_list {
                write!(f, "!")?;
            }
            write!(f, "]")?;
        } else {
            write!(f, "{}", self.name)?;
        }
        if self.non_null {
            write!(f, "!")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_name() {
        let ty = TypeRef::parse("User");
        assert_eq!(ty.name, "User");
        assert!(!ty.non_null && !ty.list && !ty.non_null_list);
    }

    #[test]
    fn parses_non_null_list_of_non_null() {
        let ty = TypeRef::parse("[User!]!");
        assert_eq!(ty.name, "User");
        assert!(ty.non_null);
        assert!(ty.list);
        assert!(ty.non_null_list);
    }

    #[test]
    fn normalize_strips_markers() {
        assert_eq!(TypeRef::normalize("[ID!]"), "ID");
        assert_eq!(TypeRef::normalize("String!"), "String");
    }

    #[test]
    fn display_round_trips() {
        for s in ["User", "User!", "[User]", "[User!]", "[User!]!"] {
            assert_eq!(TypeRef::parse(s).to_string(), s);
        }
    }
}
