//! 🔍 scan — a zero-copy JSON cursor. Not a parser. Definitely not a JSON library.
//!
//! 🎬 *[a 40 MB search response lands in a buffer. serde_json cracks its knuckles.]*
//! *["Not today," says the cursor. "We only need four fields and some byte ranges."]*
//!
//! The whole point of this crate is to NOT build a tree for every document. So this module
//! gives exactly three primitives over a raw `&[u8]`:
//!
//! - **find by path**: walk object members by key name, skipping everything else unparsed
//! - **enter array**: lazily yield each element, one at a time
//! - **raw span**: the exact bytes of the current value, no re-encoding
//!
//! Skipping a value means finding where it ends. Strings are skipped with `memchr2` on
//! `"` and `\`, containers by counting brackets (strings inside them are skipped properly,
//! so a `}` in a string never fools us). Scalars end at the next delimiter.
//!
//! ⚠️ Validation is intentionally shallow: we check what we walk through, not what we skip.
//! A malformed `_source` body is the backend's problem and gets passed along byte-exact. 🦆

use std::borrow::Cow;

use memchr::{memchr, memchr2};

use crate::error::{StructuralError, ValueKind};

/// 💀 A low-level "this isn't JSON" at some absolute offset. Gets a path attached later,
/// only when it actually becomes an error, so the happy path never formats strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanFault {
    offset: usize,
    reason: &'static str,
}

impl ScanFault {
    fn at(offset: usize, reason: &'static str) -> Self {
        Self { offset, reason }
    }

    pub(crate) fn into_structural(self, path: &str) -> StructuralError {
        StructuralError::malformed(path, self.offset, self.reason)
    }
}

/// 📍 A located value: its kind and its byte range inside the original buffer.
///
/// `Copy`, because it's just two offsets and a borrow. Hand it around like free samples.
#[derive(Debug, Clone, Copy)]
pub struct RawValue<'a> {
    buf: &'a [u8],
    start: usize,
    end: usize,
    kind: ValueKind,
}

impl<'a> RawValue<'a> {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// 📦 The exact bytes of this value, quotes and braces included. Zero copies were harmed.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buf[self.start..self.end]
    }

    /// 🔍 Descend through object members by key. `base` is this value's own path and is only
    /// used to make error messages point at the right field.
    pub fn find(&self, base: &str, path: &[&str]) -> Result<RawValue<'a>, StructuralError> {
        let mut current = *self;
        for (depth, key) in path.iter().enumerate() {
            if current.kind != ValueKind::Object {
                return Err(StructuralError::wrong_type(
                    dotted(base, &path[..depth]),
                    ValueKind::Object,
                    current.kind,
                ));
            }
            current = match current.member(key) {
                Ok(Some(found)) => found,
                Ok(None) => return Err(StructuralError::missing(dotted(base, &path[..=depth]))),
                Err(fault) => return Err(fault.into_structural(&dotted(base, &path[..depth]))),
            };
        }
        Ok(current)
    }

    /// 🚶 Enter an array. Elements come out one at a time; nothing is collected.
    pub fn elements(&self, base: &str) -> Result<ArrayElements<'a>, StructuralError> {
        if self.kind != ValueKind::Array {
            return Err(StructuralError::wrong_type(base, ValueKind::Array, self.kind));
        }
        Ok(ArrayElements {
            cursor: Cursor {
                buf: self.buf,
                pos: self.start + 1,
            },
            base: base.to_string(),
            index: 0,
            done: false,
        })
    }

    /// 🔢 A non-negative integer, the way shard and hit counts come back.
    pub fn as_u64(&self, path: &str) -> Result<u64, StructuralError> {
        if self.kind != ValueKind::Number {
            return Err(StructuralError::wrong_type(path, ValueKind::Number, self.kind));
        }
        std::str::from_utf8(self.as_bytes())
            .ok()
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| {
                StructuralError::malformed(path, self.start, "expected a non-negative integer")
            })
    }

    /// 🧵 A string value. Borrowed when there are no escapes (the scroll id case), decoded
    /// through serde_json when there are.
    pub fn as_str(&self, path: &str) -> Result<Cow<'a, str>, StructuralError> {
        if self.kind != ValueKind::String {
            return Err(StructuralError::wrong_type(path, ValueKind::String, self.kind));
        }
        let quoted = self.as_bytes();
        let inner = &quoted[1..quoted.len() - 1];
        if memchr(b'\\', inner).is_none() {
            return std::str::from_utf8(inner)
                .map(Cow::Borrowed)
                .map_err(|_| StructuralError::malformed(path, self.start, "string is not valid UTF-8"));
        }
        serde_json::from_slice::<String>(quoted)
            .map(Cow::Owned)
            .map_err(|_| StructuralError::malformed(path, self.start, "invalid escape sequence in string"))
    }

    /// 🗂️ Several sibling members in ONE pass over this object, in the order of `keys`.
    /// Missing keys come back as `None`; the walk stops as soon as every key has turned up.
    /// On duplicate keys the first one wins, same as [`find`](Self::find).
    pub fn members<const N: usize>(
        &self,
        base: &str,
        keys: [&str; N],
    ) -> Result<[Option<RawValue<'a>>; N], StructuralError> {
        if self.kind != ValueKind::Object {
            return Err(StructuralError::wrong_type(dotted(base, &[]), ValueKind::Object, self.kind));
        }
        let mut found = [None; N];
        let mut pending = N;
        self.walk_members(|quoted, value| {
            for (slot, key) in found.iter_mut().zip(keys) {
                if slot.is_none() && key_matches(quoted, key) {
                    *slot = Some(value);
                    pending -= 1;
                    break;
                }
            }
            pending == 0
        })
        .map_err(|fault| fault.into_structural(&dotted(base, &[])))?;
        Ok(found)
    }

    /// 🔑 Linear scan of this object's members for `key`.
    fn member(&self, key: &str) -> Result<Option<RawValue<'a>>, ScanFault> {
        let mut found = None;
        self.walk_members(|quoted, value| {
            if key_matches(quoted, key) {
                found = Some(value);
            }
            found.is_some()
        })?;
        Ok(found)
    }

    /// 🚶 Hand each `(quoted key, value)` of this object to `visit` until it returns `true` or
    /// the members run out. Values are skipped, never looked at.
    fn walk_members<F>(&self, mut visit: F) -> Result<(), ScanFault>
    where
        F: FnMut(&[u8], RawValue<'a>) -> bool,
    {
        let mut cursor = Cursor {
            buf: self.buf,
            pos: self.start + 1,
        };
        cursor.skip_ws();
        if cursor.peek() == Some(b'}') {
            return Ok(());
        }
        loop {
            cursor.skip_ws();
            if cursor.peek() != Some(b'"') {
                return Err(ScanFault::at(cursor.pos, "expected an object key"));
            }
            let key_start = cursor.pos;
            let key_end = cursor.string_end(key_start)?;
            cursor.pos = key_end;

            cursor.skip_ws();
            cursor.expect(b':', "expected ':' after object key")?;
            let value = cursor.value()?;
            if visit(&self.buf[key_start..key_end], value) {
                return Ok(());
            }

            cursor.skip_ws();
            match cursor.peek() {
                Some(b',') => cursor.pos += 1,
                Some(b'}') => return Ok(()),
                _ => return Err(ScanFault::at(cursor.pos, "expected ',' or '}' in object")),
            }
        }
    }
}

/// 🔍 Locate `path` starting from the top-level object of `buf`.
///
/// ```
/// let buf = br#"{"hits":{"total":3,"hits":[]}}"#;
/// let total = esx::scan::find_path(buf, &["hits", "total"]).unwrap();
/// assert_eq!(total.as_u64("hits.total").unwrap(), 3);
/// ```
pub fn find_path<'a>(buf: &'a [u8], path: &[&str]) -> Result<RawValue<'a>, StructuralError> {
    root(buf)?.find("", path)
}

/// 🌳 The top-level value of `buf`, which must be an object.
pub fn root(buf: &[u8]) -> Result<RawValue<'_>, StructuralError> {
    let mut cursor = Cursor { buf, pos: 0 };
    let top = cursor.value().map_err(|fault| fault.into_structural("$"))?;
    if top.kind != ValueKind::Object {
        return Err(StructuralError::wrong_type("$", ValueKind::Object, top.kind));
    }
    Ok(top)
}

/// 🚶 Lazy walk over an array's elements. Stops for good after the first fault.
#[derive(Debug)]
pub struct ArrayElements<'a> {
    cursor: Cursor<'a>,
    base: String,
    index: usize,
    done: bool,
}

impl<'a> ArrayElements<'a> {
    /// 📍 Path of the element most recently yielded, e.g. `hits.hits[2]`.
    pub fn current_path(&self) -> String {
        format!("{}[{}]", self.base, self.index.saturating_sub(1))
    }

    fn fail(&mut self, fault: ScanFault) -> Option<Result<RawValue<'a>, StructuralError>> {
        self.done = true;
        Some(Err(fault.into_structural(&format!("{}[{}]", self.base, self.index))))
    }
}

impl<'a> Iterator for ArrayElements<'a> {
    type Item = Result<RawValue<'a>, StructuralError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.cursor.skip_ws();
        if self.index == 0 {
            if self.cursor.peek() == Some(b']') {
                self.done = true;
                return None;
            }
        } else {
            match self.cursor.peek() {
                Some(b',') => self.cursor.pos += 1,
                Some(b']') => {
                    self.done = true;
                    return None;
                }
                _ => {
                    let pos = self.cursor.pos;
                    return self.fail(ScanFault::at(pos, "expected ',' or ']' in array"));
                }
            }
        }
        match self.cursor.value() {
            Ok(value) => {
                self.index += 1;
                Some(Ok(value))
            }
            Err(fault) => self.fail(fault),
        }
    }
}

/// 🧭 The actual byte-walker. Position only moves forward.
#[derive(Debug, Clone)]
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8, reason: &'static str) -> Result<(), ScanFault> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ScanFault::at(self.pos, reason))
        }
    }

    /// 📦 Classify and skip the value at the cursor, returning its span.
    fn value(&mut self) -> Result<RawValue<'a>, ScanFault> {
        self.skip_ws();
        let start = self.pos;
        let first = self
            .peek()
            .ok_or(ScanFault::at(start, "unexpected end of input"))?;
        let (kind, end) = match first {
            b'{' => (ValueKind::Object, self.container_end(start)?),
            b'[' => (ValueKind::Array, self.container_end(start)?),
            b'"' => (ValueKind::String, self.string_end(start)?),
            b'-' | b'0'..=b'9' => (ValueKind::Number, self.scalar_end(start)),
            b't' => (ValueKind::Bool, self.literal_end(start, b"true")?),
            b'f' => (ValueKind::Bool, self.literal_end(start, b"false")?),
            b'n' => (ValueKind::Null, self.literal_end(start, b"null")?),
            _ => return Err(ScanFault::at(start, "unexpected byte at start of value")),
        };
        self.pos = end;
        Ok(RawValue {
            buf: self.buf,
            start,
            end,
            kind,
        })
    }

    /// 🧵 `start` is the opening quote. Returns the index just past the closing quote.
    fn string_end(&self, start: usize) -> Result<usize, ScanFault> {
        let mut i = start + 1;
        while i < self.buf.len() {
            match memchr2(b'"', b'\\', &self.buf[i..]) {
                None => break,
                Some(offset) => {
                    let hit = i + offset;
                    if self.buf[hit] == b'"' {
                        return Ok(hit + 1);
                    }
                    // -- backslash: whatever follows is escaped, including a quote
                    i = hit + 2;
                }
            }
        }
        Err(ScanFault::at(start, "unterminated string"))
    }

    /// 📦 `start` is `{` or `[`. Returns the index just past the matching close.
    fn container_end(&self, start: usize) -> Result<usize, ScanFault> {
        let mut depth = 0usize;
        let mut i = start;
        while i < self.buf.len() {
            match self.buf[i] {
                b'"' => {
                    i = self.string_end(i)?;
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(ScanFault::at(start, "unterminated object or array"))
    }

    fn scalar_end(&self, start: usize) -> usize {
        let mut i = start;
        while i < self.buf.len()
            && !matches!(self.buf[i], b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r')
        {
            i += 1;
        }
        i
    }

    fn literal_end(&self, start: usize, literal: &[u8]) -> Result<usize, ScanFault> {
        let end = start + literal.len();
        if self.buf.get(start..end) == Some(literal) {
            Ok(end)
        } else {
            Err(ScanFault::at(start, "invalid literal"))
        }
    }
}

/// 🔑 `quoted` includes the surrounding quotes. Escaped keys are rare enough to decode.
fn key_matches(quoted: &[u8], key: &str) -> bool {
    let inner = &quoted[1..quoted.len() - 1];
    if memchr(b'\\', inner).is_none() {
        return inner == key.as_bytes();
    }
    serde_json::from_slice::<String>(quoted)
        .map(|decoded| decoded == key)
        .unwrap_or(false)
}

fn dotted(base: &str, keys: &[&str]) -> String {
    let mut path = String::from(base);
    for key in keys {
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key);
    }
    if path.is_empty() {
        path.push('$');
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralErrorKind;

    #[test]
    fn the_one_where_a_nested_path_is_found_without_a_tree() {
        let buf = br#"{ "took": 3, "_shards": {"total": 5, "failed": 0}, "hits": {"total": 42} }"#;
        let failed = find_path(buf, &["_shards", "failed"]).unwrap();
        assert_eq!(failed.kind(), ValueKind::Number);
        assert_eq!(failed.as_u64("_shards.failed").unwrap(), 0);
        let total = find_path(buf, &["hits", "total"]).unwrap();
        assert_eq!(total.as_u64("hits.total").unwrap(), 42);
    }

    #[test]
    fn the_one_where_braces_inside_strings_do_not_fool_anyone() {
        let buf = br#"{"decoy":{"text":"}}]] \"quoted\" {{[","n":1},"target":"found"}"#;
        let target = find_path(buf, &["target"]).unwrap();
        assert_eq!(target.as_str("target").unwrap(), "found");
    }

    #[test]
    fn the_one_where_raw_spans_are_byte_exact() {
        let doc = r#"{"emoji":"🔥","esc":"a\"b\\c","n":[1, 2.5e3, -0],"ok":true,"nil":null}"#;
        let buf = format!(r#"{{"wrapper":{}}}"#, doc);
        let wrapper = find_path(buf.as_bytes(), &["wrapper"]).unwrap();
        assert_eq!(wrapper.as_bytes(), doc.as_bytes());
        assert_eq!(wrapper.kind(), ValueKind::Object);
    }

    #[test]
    fn the_one_where_array_elements_arrive_one_by_one() {
        let buf = br#"{"arr": [ {"a":1} , "two",3,[4],null ] }"#;
        let arr = find_path(buf, &["arr"]).unwrap();
        let kinds: Vec<ValueKind> = arr
            .elements("arr")
            .unwrap()
            .map(|element| element.unwrap().kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ValueKind::Object,
                ValueKind::String,
                ValueKind::Number,
                ValueKind::Array,
                ValueKind::Null
            ]
        );
    }

    #[test]
    fn the_one_where_an_empty_array_yields_nothing() {
        let buf = br#"{"arr":[  ]}"#;
        let arr = find_path(buf, &["arr"]).unwrap();
        assert_eq!(arr.elements("arr").unwrap().count(), 0);
    }

    #[test]
    fn the_one_where_a_missing_key_reports_the_full_path() {
        let buf = br#"{"hits":{"total":1}}"#;
        let err = find_path(buf, &["hits", "hits"]).unwrap_err();
        assert_eq!(err.path, "hits.hits");
        assert_eq!(err.kind, StructuralErrorKind::Missing);
    }

    #[test]
    fn the_one_where_descending_into_a_scalar_is_a_type_error() {
        let buf = br#"{"hits":7}"#;
        let err = find_path(buf, &["hits", "hits"]).unwrap_err();
        assert_eq!(err.path, "hits");
        assert_eq!(
            err.kind,
            StructuralErrorKind::WrongType {
                expected: ValueKind::Object,
                found: ValueKind::Number
            }
        );
    }

    #[test]
    fn the_one_where_elements_of_a_non_array_are_refused() {
        let buf = br#"{"hits":{"hits":"nope"}}"#;
        let hits = find_path(buf, &["hits", "hits"]).unwrap();
        let err = hits.elements("hits.hits").unwrap_err();
        assert_eq!(
            err.kind,
            StructuralErrorKind::WrongType {
                expected: ValueKind::Array,
                found: ValueKind::String
            }
        );
    }

    #[test]
    fn the_one_where_truncated_input_is_malformed_not_missing() {
        let buf = br#"{"a":"never ends"#;
        let err = find_path(buf, &["a"]).unwrap_err();
        assert!(matches!(err.kind, StructuralErrorKind::Malformed { .. }), "got {err:?}");
    }

    #[test]
    fn the_one_where_a_broken_array_stops_the_walk() {
        let buf = br#"{"arr":[1 2]}"#;
        let arr = find_path(buf, &["arr"]).unwrap();
        let mut elements = arr.elements("arr").unwrap();
        assert!(elements.next().unwrap().is_ok());
        let err = elements.next().unwrap().unwrap_err();
        assert_eq!(err.path, "arr[1]");
        assert!(elements.next().is_none(), "iteration is over after a fault");
    }

    #[test]
    fn the_one_where_escaped_strings_get_decoded() {
        let buf = br#"{"id":"line\nbreak \u00e9"}"#;
        let id = find_path(buf, &["id"]).unwrap();
        assert_eq!(id.as_str("id").unwrap(), "line\nbreak é");
    }

    #[test]
    fn the_one_where_escaped_keys_still_match() {
        let buf = br#"{"\u005fscroll_id":"abc"}"#;
        let id = find_path(buf, &["_scroll_id"]).unwrap();
        assert_eq!(id.as_str("_scroll_id").unwrap(), "abc");
    }

    #[test]
    fn the_one_where_negative_counts_are_rejected() {
        let buf = br#"{"failed":-1}"#;
        let failed = find_path(buf, &["failed"]).unwrap();
        assert!(failed.as_u64("failed").is_err());
    }

    #[test]
    fn the_one_where_the_top_level_must_be_an_object() {
        let err = root(b"[1,2,3]").unwrap_err();
        assert_eq!(err.path, "$");
    }

    #[test]
    fn the_one_where_siblings_are_collected_in_one_walk() {
        let buf = br#"{"hits":{"hits":[1,2],"total":7},"_scroll_id":"s","_scroll_id":"dup"}"#;
        let [scroll_id, shards, hits] = root(buf).unwrap().members("", ["_scroll_id", "_shards", "hits"]).unwrap();
        assert_eq!(scroll_id.unwrap().as_str("_scroll_id").unwrap(), "s", "first duplicate wins");
        assert!(shards.is_none());

        let [total, array] = hits.unwrap().members("hits", ["total", "hits"]).unwrap();
        assert_eq!(total.unwrap().as_u64("hits.total").unwrap(), 7);
        assert_eq!(array.unwrap().as_bytes(), b"[1,2]");
    }

    #[test]
    fn the_one_where_members_of_a_non_object_are_refused() {
        let array = find_path(br#"{"hits":[]}"#, &["hits"]).unwrap();
        let err = array.members("hits", ["total"]).unwrap_err();
        assert_eq!(err.path, "hits");
        assert_eq!(
            err.kind,
            StructuralErrorKind::WrongType {
                expected: ValueKind::Object,
                found: ValueKind::Array
            }
        );
    }
}
