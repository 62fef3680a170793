use std::io::{self, Write};
use std::sync::Arc;

use crate::types::Type;

/// A runtime value. Lists and objects sit behind `Arc` so that cloning a
/// value (or a whole data area, when the VM shards a loop across workers)
/// is cheap and `Send`; mutation goes through `Arc::make_mut`, which copies
/// on write when the value is shared.
///
/// Objects are positional: field names live in the `Object` type, not in
/// the value, and field access is by resolved numeric position.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Num(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Obj(Arc<Vec<Value>>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Bool(false)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(vs: Vec<Value>) -> Self {
        Value::List(Arc::new(vs))
    }
}

impl Value {
    /// to-bool coercion: 0 and NaN are false, the empty string is false,
    /// empty collections are false.
    pub fn truth(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Num(n) => !n.is_nan() && *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Obj(o) => !o.is_empty(),
        }
    }

    /// to-number coercion: strings parse (0 on failure), bools map to 1/0,
    /// collections are NaN.
    pub fn num(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Str(s) => s.parse().unwrap_or(0.0),
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::List(_) | Value::Obj(_) => f64::NAN,
        }
    }

    /// to-string coercion: scalars render canonically, collections are "".
    pub fn text(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Num(n) => format!("{}", n),
            Value::Bool(b) => format!("{}", b),
            Value::List(_) | Value::Obj(_) => String::new(),
        }
    }

    /// to-list coercion: scalars wrap into a singleton.
    pub fn list(self) -> Arc<Vec<Value>> {
        match self {
            Value::List(l) => l,
            other => Arc::new(vec![other]),
        }
    }

    /// Equality with the coercion ladder: toward number if either side is a
    /// number, then toward string, then bool. Number-vs-string compares
    /// against the parsed string and is unequal when the parse fails, so
    /// `0 == ""` is false in both orderings. Collections compare
    /// elementwise and positionally; a collection never equals a scalar.
    pub fn equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Num(a), Num(b)) => a == b,
            (Num(n), Str(s)) | (Str(s), Num(n)) => match s.parse::<f64>() {
                Ok(x) => x == *n,
                Err(_) => false,
            },
            (Num(n), Bool(b)) | (Bool(b), Num(n)) => *n == if *b { 1.0 } else { 0.0 },
            (Str(a), Str(b)) => a == b,
            (Str(s), Bool(b)) | (Bool(b), Str(s)) => **s == *format!("{}", b),
            (Bool(a), Bool(b)) => a == b,
            (List(a), List(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y)),
            (Obj(a), Obj(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y)),
            _ => false,
        }
    }

    /// Quote the value as strict JSON. The type supplies list element types
    /// and object field names; `limit` caps the element count of the
    /// top-level list only.
    pub fn quote(&self, w: &mut impl Write, t: &Type, limit: Option<usize>) -> io::Result<()> {
        match self {
            Value::Bool(b) => write!(w, "{}", b),
            Value::Num(n) => {
                if n.is_finite() {
                    write!(w, "{}", n)
                } else {
                    write!(w, "\"{}\"", n)
                }
            }
            Value::Str(s) => write!(w, "{}", json_quote(s)),
            Value::List(l) => {
                let elem = match t {
                    Type::List(e) => e.as_ref(),
                    _ => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("internal error: {} is not a list", t.kind()),
                        ))
                    }
                };
                write!(w, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if let Some(max) = limit {
                        if i >= max {
                            break;
                        }
                    }
                    if i != 0 {
                        write!(w, ", ")?;
                    }
                    v.quote(w, elem, None)?;
                }
                write!(w, "]")
            }
            Value::Obj(o) => {
                let fields = match t {
                    Type::Object(fs) => fs,
                    _ => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("internal error: {} is not an object", t.kind()),
                        ))
                    }
                };
                write!(w, "{{")?;
                for (i, v) in o.iter().enumerate() {
                    if i != 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{}: ", json_quote(&fields[i].name))?;
                    v.quote(w, &fields[i].ty, None)?;
                }
                write!(w, "}}")
            }
        }
    }
}

/// JSON-escape a string, double quotes included.
pub fn json_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjField, Type};

    fn num(n: f64) -> Value {
        Value::Num(n)
    }

    fn str_(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn truth_coercions() {
        assert!(!num(0.0).truth());
        assert!(!num(f64::NAN).truth());
        assert!(num(-1.5).truth());
        assert!(!str_("").truth());
        assert!(str_("x").truth());
        assert!(!Value::from(Vec::new()).truth());
        assert!(Value::from(vec![num(1.0)]).truth());
    }

    #[test]
    fn num_coercions() {
        assert_eq!(str_("1.5").num(), 1.5);
        assert_eq!(str_("nope").num(), 0.0);
        assert_eq!(Value::Bool(true).num(), 1.0);
        assert!(Value::from(Vec::new()).num().is_nan());
    }

    #[test]
    fn text_coercions() {
        assert_eq!(num(12.0).text(), "12");
        assert_eq!(num(0.25).text(), "0.25");
        assert_eq!(Value::Bool(false).text(), "false");
        assert_eq!(Value::from(Vec::new()).text(), "");
    }

    #[test]
    fn equals_within_kind() {
        assert!(num(1.0).equals(&num(1.0)));
        assert!(!num(1.0).equals(&num(2.0)));
        assert!(str_("a").equals(&str_("a")));
        assert!(Value::Bool(true).equals(&Value::Bool(true)));
    }

    #[test]
    fn equals_number_string_coercion() {
        assert!(num(1.0).equals(&str_("1")));
        assert!(str_("1").equals(&num(1.0)));
        // a string that does not parse never equals a number
        assert!(!num(0.0).equals(&str_("")));
        assert!(!str_("").equals(&num(0.0)));
        assert!(!num(0.0).equals(&str_("abc")));
    }

    #[test]
    fn equals_lists_positional() {
        let a = Value::from(vec![num(1.0), num(2.0)]);
        let b = Value::from(vec![num(1.0), num(2.0)]);
        let c = Value::from(vec![num(2.0), num(1.0)]);
        let short = Value::from(vec![num(1.0)]);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
        assert!(!a.equals(&short));
    }

    #[test]
    fn equals_collection_vs_scalar() {
        let l = Value::from(vec![num(1.0)]);
        assert!(!l.equals(&num(1.0)));
        assert!(!num(1.0).equals(&l));
    }

    #[test]
    fn quote_scalars() {
        let mut buf = Vec::new();
        num(0.25).quote(&mut buf, &Type::Scalar, None).unwrap();
        assert_eq!(buf, b"0.25");

        let mut buf = Vec::new();
        str_("he\"y").quote(&mut buf, &Type::Scalar, None).unwrap();
        assert_eq!(buf, b"\"he\\\"y\"");

        let mut buf = Vec::new();
        num(f64::NAN).quote(&mut buf, &Type::Scalar, None).unwrap();
        assert_eq!(buf, b"\"NaN\"");
    }

    #[test]
    fn quote_list_with_limit() {
        let l = Value::from(vec![num(1.0), num(2.0), num(3.0)]);
        let t = Type::List(Box::new(Type::Scalar));

        let mut buf = Vec::new();
        l.quote(&mut buf, &t, None).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[1, 2, 3]");

        let mut buf = Vec::new();
        l.quote(&mut buf, &t, Some(2)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[1, 2]");
    }

    #[test]
    fn quote_object_field_order() {
        let t = Type::Object(vec![
            ObjField { name: "id".into(), ty: Type::Scalar },
            ObjField { name: "name".into(), ty: Type::Scalar },
        ]);
        let o = Value::Obj(Arc::new(vec![num(1.0), str_("foo")]));
        let mut buf = Vec::new();
        o.quote(&mut buf, &t, None).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{\"id\": 1, \"name\": \"foo\"}");
    }
}
