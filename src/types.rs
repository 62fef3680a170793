/// A named, typed object field. Order is significant: the position of a
/// field in this list is the position of its value in the object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjField {
    pub name: String,
    pub ty: Type,
}

/// A function signature: result type plus one type per argument.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncType {
    pub ret: Type,
    pub args: Vec<Type>,
}

/// A type term. `Scalar` covers bools, numbers and strings alike; the VM
/// distinguishes scalar kinds dynamically. The `Of*` variants are symbolic
/// references recorded during elaboration and resolved by `Decls::verify`;
/// a fully resolved type contains none of them.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Scalar,
    List(Box<Type>),
    Object(Vec<ObjField>),
    Func(Box<FuncType>),

    /// The type of the expression with the given id.
    OfExpr(i64),
    /// The type of a field of the expression with the given id.
    OfField(i64, String),
    /// The element type of the list-valued expression with the given id.
    OfElem(i64),
    /// The type of a declared identifier.
    OfIdent(String),
    /// The type of a built-in function.
    OfFunc(String),
}

impl Type {
    pub fn kind(&self) -> &'static str {
        match self {
            Type::Scalar => "scalar",
            Type::List(_) => "list",
            Type::Object(_) => "object",
            Type::Func(_) => "function",
            Type::OfExpr(_) => "typeOfExpr",
            Type::OfField(..) => "typeOfField",
            Type::OfElem(_) => "typeOfElem",
            Type::OfIdent(_) => "typeOfIdent",
            Type::OfFunc(_) => "typeOfFunc",
        }
    }
}

/// Position of a field by name, if present.
pub fn field_pos(fields: &[ObjField], name: &str) -> Option<usize> {
    fields.iter().position(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup() {
        let fields = vec![
            ObjField { name: "id".into(), ty: Type::Scalar },
            ObjField { name: "name".into(), ty: Type::Scalar },
        ];
        assert_eq!(field_pos(&fields, "id"), Some(0));
        assert_eq!(field_pos(&fields, "name"), Some(1));
        assert_eq!(field_pos(&fields, "missing"), None);
    }

    #[test]
    fn kinds() {
        assert_eq!(Type::Scalar.kind(), "scalar");
        assert_eq!(Type::List(Box::new(Type::Scalar)).kind(), "list");
        assert_eq!(Type::OfIdent("x".into()).kind(), "typeOfIdent");
    }
}
