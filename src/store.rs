use std::io::BufRead;
use std::path::Path;

use indexmap::IndexMap;
use quick_xml::events::Event;
use regex::Regex;
use tracing::warn;

use crate::decls::Decls;
use crate::funcs::builtins;
use crate::types::{field_pos, ObjField, Type};
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid file name: '{0}' cannot be used as an identifier")]
    InvalidName(String),
    #[error("unknown content type {0} (use one of json, xml, csv, txt)")]
    UnknownFormat(String),
    #[error("failed to load {file}: {message}")]
    Load { file: String, message: String },
}

/// The symbol table the loaders fill: identifier → (type, value). Each
/// file contributes one global named after its base name.
#[derive(Default)]
pub struct Store {
    types: IndexMap<String, Type>,
    values: IndexMap<String, Value>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn is_def(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Bind a name directly, bypassing the loaders.
    pub fn define(&mut self, name: &str, t: Type, v: Value) {
        self.types.insert(name.to_string(), t);
        self.values.insert(name.to_string(), v);
    }

    /// Load a document. The extension picks the format; the base name up
    /// to the first dot becomes the identifier.
    pub fn add(&mut self, file_name: &str, r: impl BufRead) -> Result<(), StoreError> {
        let base = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match base.find('.') {
            Some(dot) if dot > 0 => base[..dot].to_string(),
            _ => base,
        };

        if !is_ident(&name) {
            return Err(StoreError::InvalidName(name));
        }

        let ext = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();

        let loaded = match ext.as_str() {
            "json" => read_json(r),
            "xml" => read_xml(r),
            "csv" => read_text(CsvLines::new(r), file_name),
            "txt" => read_text(TabLines::new(r), file_name),
            other => return Err(StoreError::UnknownFormat(format!(".{}", other))),
        };

        let (t, v) = loaded.map_err(|message| StoreError::Load { file: file_name.to_string(), message })?;
        self.define(&name, t, v);

        Ok(())
    }

    /// A fresh declarations table holding every loaded global plus the
    /// built-in functions.
    pub fn decls(&self) -> Decls {
        let mut d = Decls::new();
        for (name, v) in &self.values {
            if let Some(t) = self.types.get(name) {
                let _ = d.declare(name, Some(v.clone()), t.clone());
            }
        }
        for f in builtins() {
            d.add_func(f);
        }
        d
    }
}

fn is_ident(s: &str) -> bool {
    Regex::new(r"^\w+$").map(|re| re.is_match(s)).unwrap_or(false)
}

/// Numeric-looking text becomes a number; NaN and infinities stay text.
fn to_scalar(s: &str) -> Value {
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Num(n),
        _ => Value::from(s),
    }
}

// ── Tab-delimited and CSV ────────────────────────────────────────────

trait LineReader {
    fn read(&mut self) -> Result<Option<Vec<String>>, String>;
}

struct TabLines<R: BufRead> {
    r: R,
}

impl<R: BufRead> TabLines<R> {
    fn new(r: R) -> Self {
        TabLines { r }
    }
}

impl<R: BufRead> LineReader for TabLines<R> {
    fn read(&mut self) -> Result<Option<Vec<String>>, String> {
        let mut line = String::new();
        let n = self.r.read_line(&mut line).map_err(|e| e.to_string())?;
        if n == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        Ok(Some(line.split('\t').map(str::to_string).collect()))
    }
}

struct CsvLines<R: BufRead> {
    records: csv::StringRecordsIntoIter<R>,
}

impl<R: BufRead> CsvLines<R> {
    fn new(r: R) -> Self {
        let reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(r);
        CsvLines { records: reader.into_records() }
    }
}

impl<R: BufRead> LineReader for CsvLines<R> {
    fn read(&mut self) -> Result<Option<Vec<String>>, String> {
        match self.records.next() {
            None => Ok(None),
            Some(Err(e)) => Err(e.to_string()),
            Some(Ok(rec)) => Ok(Some(rec.iter().map(str::to_string).collect())),
        }
    }
}

/// Header row names the fields; every record becomes an object. Short
/// rows are padded with empty strings, long rows truncated.
fn read_text(mut lines: impl LineReader, file_name: &str) -> Result<(Type, Value), String> {
    let head = lines.read()?.ok_or_else(|| "missing header row".to_string())?;

    let fields: Vec<ObjField> = head
        .iter()
        .map(|f| ObjField { name: f.trim_matches(|c| " \r\n".contains(c)).to_string(), ty: Type::Scalar })
        .collect();

    let mut rows = Vec::new();
    let mut line_no = 0;
    while let Some(mut rec) = lines.read()? {
        if rec.len() > fields.len() {
            warn!("{}: line {}: truncating object (-{} fields)", file_name, line_no, rec.len() - fields.len());
            rec.truncate(fields.len());
        } else if rec.len() < fields.len() {
            warn!("{}: line {}: missing fields, appending blank strings", file_name, line_no);
            rec.resize(fields.len(), String::new());
        }

        let obj: Vec<Value> = rec.iter().map(|s| to_scalar(s)).collect();
        rows.push(Value::Obj(std::sync::Arc::new(obj)));
        line_no += 1;
    }

    Ok((Type::List(Box::new(Type::Object(fields))), Value::from(rows)))
}

// ── Generic document shape ───────────────────────────────────────────

/// The raw shape shared by the JSON and XML loaders before typing.
enum Raw {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Raw>),
    Map(IndexMap<String, Raw>),
}

impl Raw {
    fn from_json(v: serde_json::Value) -> Raw {
        match v {
            serde_json::Value::Null => Raw::Null,
            serde_json::Value::Bool(b) => Raw::Bool(b),
            serde_json::Value::Number(n) => Raw::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Raw::Str(s),
            serde_json::Value::Array(elems) => Raw::List(elems.into_iter().map(Raw::from_json).collect()),
            serde_json::Value::Object(entries) => {
                Raw::Map(entries.into_iter().map(|(k, v)| (k, Raw::from_json(v))).collect())
            }
        }
    }
}

/// Walk a raw document, producing its type and value together. `head`
/// carries the type inferred so far: later list elements must stay
/// congruent with earlier ones (same object shape), while scalar kinds
/// may mix freely.
fn traverse(head: Option<&Type>, v: &Raw) -> Result<(Type, Value), String> {
    match v {
        Raw::Null => Ok((Type::Scalar, Value::Bool(false))),
        Raw::Bool(b) => scalar(head, Value::Bool(*b)),
        Raw::Num(n) => scalar(head, Value::Num(*n)),
        Raw::Str(s) => scalar(head, Value::from(s.as_str())),

        Raw::List(elems) => {
            let mut elem_head = match head {
                None => None,
                Some(Type::List(e)) => Some((**e).clone()),
                Some(other) => return Err(format!("expected {}, got list", other.kind())),
            };

            let mut vals = Vec::with_capacity(elems.len());
            for e in elems {
                let (t, val) = traverse(elem_head.as_ref(), e)?;
                elem_head = Some(t);
                vals.push(val);
            }

            Ok((Type::List(Box::new(elem_head.unwrap_or(Type::Scalar))), Value::from(vals)))
        }

        Raw::Map(entries) => match head {
            None => {
                let mut fields = Vec::with_capacity(entries.len());
                let mut vals = Vec::with_capacity(entries.len());
                for (name, value) in entries {
                    let (t, val) = traverse(None, value)?;
                    fields.push(ObjField { name: name.clone(), ty: t });
                    vals.push(val);
                }
                Ok((Type::Object(fields), Value::Obj(std::sync::Arc::new(vals))))
            }
            Some(Type::Object(expected)) => {
                if expected.len() != entries.len() {
                    return Err(format!(
                        "invalid object type, expected {} fields, got {}",
                        expected.len(),
                        entries.len()
                    ));
                }
                let mut vals = vec![Value::default(); expected.len()];
                for (name, value) in entries {
                    let Some(pos) = field_pos(expected, name) else {
                        return Err(format!("cannot find field {} in the inferred object type", name));
                    };
                    let (_, val) = traverse(Some(&expected[pos].ty), value)?;
                    vals[pos] = val;
                }
                Ok((Type::Object(expected.clone()), Value::Obj(std::sync::Arc::new(vals))))
            }
            Some(other) => Err(format!("expected {}, got object", other.kind())),
        },
    }
}

fn scalar(head: Option<&Type>, v: Value) -> Result<(Type, Value), String> {
    match head {
        None | Some(Type::Scalar) => Ok((Type::Scalar, v)),
        Some(other) => Err(format!("expected {}, got scalar", other.kind())),
    }
}

// ── JSON ─────────────────────────────────────────────────────────────

fn read_json(r: impl BufRead) -> Result<(Type, Value), String> {
    let data: serde_json::Value = serde_json::from_reader(r).map_err(|e| e.to_string())?;
    traverse(None, &Raw::from_json(data))
}

// ── XML ──────────────────────────────────────────────────────────────

fn new_elem() -> IndexMap<String, Raw> {
    let mut m = IndexMap::new();
    m.insert("text()".to_string(), Raw::Str(String::new()));
    m
}

/// Attach a closed element to its parent; repeated sibling tags collect
/// into a list.
fn attach(parent: &mut IndexMap<String, Raw>, name: &str, val: Raw) {
    match parent.get_mut(name) {
        Some(Raw::List(items)) => items.push(val),
        Some(prev) => {
            let prev = std::mem::replace(prev, Raw::Null);
            parent.insert(name.to_string(), Raw::List(vec![prev, val]));
        }
        None => {
            parent.insert(name.to_string(), val);
        }
    }
}

fn append_text(top: &mut IndexMap<String, Raw>, text: &str) {
    match top.get_mut("text()") {
        Some(Raw::Str(s)) => s.push_str(text),
        _ => {
            top.insert("text()".to_string(), Raw::Str(text.to_string()));
        }
    }
}

/// Event-driven XML to the raw shape: each element is an object with
/// `"text()"`, `"@attr"` entries and child elements; qualified names stay
/// `"prefix:local"`. Only UTF-8 documents are accepted.
fn read_xml(r: impl BufRead) -> Result<(Type, Value), String> {
    let mut reader = quick_xml::Reader::from_reader(r);
    let mut buf = Vec::new();

    // stack of open elements; the sentinel at the bottom is the document
    let mut stack: Vec<(String, IndexMap<String, Raw>)> = vec![(String::new(), new_elem())];

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| e.to_string())?;
        match event {
            Event::Decl(d) => {
                if let Some(enc) = d.encoding() {
                    let enc = enc.map_err(|e| e.to_string())?;
                    let enc = String::from_utf8_lossy(&enc);
                    if !enc.eq_ignore_ascii_case("utf-8") {
                        return Err(format!("unsupported document encoding {}", enc));
                    }
                }
            }
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let mut elem = new_elem();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
                    let val = attr.unescape_value().map_err(|e| e.to_string())?;
                    elem.insert(key, to_raw_scalar(&val));
                }
                stack.push((name, elem));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let mut elem = new_elem();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
                    let val = attr.unescape_value().map_err(|e| e.to_string())?;
                    elem.insert(key, to_raw_scalar(&val));
                }
                let Some((_, parent)) = stack.last_mut() else {
                    return Err("malformed document".to_string());
                };
                attach(parent, &name, Raw::Map(elem));
            }
            Event::End(e) => {
                let got = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let Some((expected, elem)) = stack.pop() else {
                    return Err("malformed document".to_string());
                };
                if stack.is_empty() || expected != got {
                    return Err(format!("element <{}> closed by </{}>", expected, got));
                }
                if let Some((_, parent)) = stack.last_mut() {
                    attach(parent, &got, Raw::Map(elem));
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if let Some((_, top)) = stack.last_mut() {
                    append_text(top, &text);
                }
            }
            Event::CData(t) => {
                let bytes = t.into_inner();
                let text = String::from_utf8_lossy(&bytes).to_string();
                if let Some((_, top)) = stack.last_mut() {
                    append_text(top, &text);
                }
            }
            Event::Eof => {
                if stack.len() > 1 {
                    return Err("unexpected end of document: unclosed element".to_string());
                }
                break;
            }
            // comments, processing instructions, doctype
            _ => {}
        }
        buf.clear();
    }

    let (_, root) = stack.remove(0);
    traverse(None, &Raw::Map(root))
}

fn to_raw_scalar(s: &str) -> Raw {
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => Raw::Num(n),
        _ => Raw::Str(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_check() {
        assert!(is_ident("xmlData"));
        assert!(is_ident("in_2"));
        assert!(!is_ident("bad-name"));
        assert!(!is_ident(""));
    }

    #[test]
    fn scalar_detection() {
        assert!(matches!(to_scalar("1.5"), Value::Num(_)));
        assert!(matches!(to_scalar("hello"), Value::Str(_)));
        assert!(matches!(to_scalar("NaN"), Value::Str(_)));
        assert!(matches!(to_scalar("Inf"), Value::Str(_)));
    }

    #[test]
    fn tab_delimited_rows() {
        let data = "id\tname\n1\thello\n2\tworld\n";
        let mut store = Store::new();
        store.add("people.txt", data.as_bytes()).unwrap();
        assert!(store.is_def("people"));

        let Some(Value::List(rows)) = store.values.get("people") else { panic!("expected list") };
        assert_eq!(rows.len(), 2);
        let Value::Obj(first) = &rows[0] else { panic!("expected object") };
        assert_eq!(first[0].num(), 1.0);
        assert_eq!(first[1].text(), "hello");
    }

    #[test]
    fn csv_rows() {
        let data = "id,name\n1,\"hello, there\"\n";
        let mut store = Store::new();
        store.add("people.csv", data.as_bytes()).unwrap();
        let Some(Value::List(rows)) = store.values.get("people") else { panic!("expected list") };
        let Value::Obj(first) = &rows[0] else { panic!("expected object") };
        assert_eq!(first[1].text(), "hello, there");
    }

    #[test]
    fn short_rows_are_padded() {
        let data = "a\tb\tc\n1\n1\t2\t3\t4\n";
        let mut store = Store::new();
        store.add("t.txt", data.as_bytes()).unwrap();
        let Some(Value::List(rows)) = store.values.get("t") else { panic!("expected list") };
        let Value::Obj(padded) = &rows[0] else { panic!("expected object") };
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[1].text(), "");
        let Value::Obj(truncated) = &rows[1] else { panic!("expected object") };
        assert_eq!(truncated.len(), 3);
    }

    #[test]
    fn bad_file_names_are_rejected() {
        let mut store = Store::new();
        let err = store.add("bad-name.json", "1".as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));

        let err = store.add("data.yaml", "1".as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownFormat(_)));
    }

    #[test]
    fn stdin_naming_convention() {
        let mut store = Store::new();
        store.add("in.json", "[1,2,3]".as_bytes()).unwrap();
        assert!(store.is_def("in"));
    }
}
