//! Minimal gettext catalog reader for PO/POT text files and compiled MO files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::io;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogEntry {
    pub msgctxt: Option<String>,
    pub msgid: String,
    pub msgid_plural: Option<String>,
    pub msgstr: String,
    pub msgstr_plural: Vec<String>,
    pub flags: Vec<String>,
    /// `(file, line)` pairs from `#:` reference comments.
    pub occurrences: Vec<(String, String)>,
    pub obsolete: bool,
    /// 1-based line of the `msgid` keyword.
    pub linenum: usize,
}

impl CatalogEntry {
    pub fn fuzzy(&self) -> bool {
        self.flags.iter().any(|f| f == "fuzzy")
    }

    pub fn translated(&self) -> bool {
        if self.obsolete || self.fuzzy() {
            return false;
        }
        if !self.msgstr.is_empty() {
            return true;
        }
        !self.msgstr_plural.is_empty() && self.msgstr_plural.iter().all(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let is_mo = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("mo"))
            .unwrap_or(false);
        if is_mo {
            parse_mo(&io::read_bytes(path, "read MO file")?)
        } else {
            parse_po(&io::read_file(path, "read PO file")?)
        }
    }

    pub fn translated_entries(&self) -> Vec<&CatalogEntry> {
        self.entries.iter().filter(|e| e.translated()).collect()
    }

    pub fn untranslated_entries(&self) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| !e.translated() && !e.obsolete && !e.fuzzy())
            .collect()
    }

    pub fn fuzzy_entries(&self) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.fuzzy() && !e.obsolete)
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Msgctxt,
    Msgid,
    MsgidPlural,
    Msgstr,
    MsgstrPlural(usize),
}

/// Parse PO/POT text. The header entry (empty msgid) is not returned.
pub fn parse_po(content: &str) -> Result<Catalog> {
    let mut catalog = Catalog::default();
    let mut current = CatalogEntry::default();
    let mut field = Field::None;
    let mut started = false;

    let finish = |entry: CatalogEntry, started: bool, catalog: &mut Catalog| {
        if started && !(entry.msgid.is_empty() && entry.msgctxt.is_none()) {
            catalog.entries.push(entry);
        }
    };

    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        let mut line = raw_line.trim();
        let mut obsolete = false;

        if let Some(rest) = line.strip_prefix("#~") {
            obsolete = true;
            line = rest.trim_start();
            if line.starts_with('|') {
                continue;
            }
        }

        if line.is_empty() {
            continue;
        }

        if !obsolete && line.starts_with('#') {
            if field != Field::None && field != Field::Msgctxt {
                finish(std::mem::take(&mut current), started, &mut catalog);
                started = false;
                field = Field::None;
            }
            if let Some(flags) = line.strip_prefix("#,") {
                current
                    .flags
                    .extend(flags.split(',').map(|f| f.trim().to_string()).filter(|f| !f.is_empty()));
            } else if let Some(refs) = line.strip_prefix("#:") {
                for reference in refs.split_whitespace() {
                    let (file, occurrence_line) = match reference.rsplit_once(':') {
                        Some((file, number)) if number.chars().all(|c| c.is_ascii_digit()) => {
                            (file.to_string(), number.to_string())
                        }
                        _ => (reference.to_string(), String::new()),
                    };
                    current.occurrences.push((file, occurrence_line));
                }
            }
            continue;
        }

        let (keyword, rest) = match line.find(char::is_whitespace) {
            Some(split) if !line.starts_with('"') => (&line[..split], line[split..].trim()),
            _ => ("", line),
        };

        match keyword {
            "msgctxt" => {
                if field != Field::None {
                    finish(std::mem::take(&mut current), started, &mut catalog);
                }
                started = true;
                current.obsolete = obsolete;
                current.msgctxt = Some(unquote(rest, line_number)?);
                field = Field::Msgctxt;
            }
            "msgid" => {
                if field != Field::None && field != Field::Msgctxt {
                    let carried = CatalogEntry::default();
                    finish(std::mem::replace(&mut current, carried), started, &mut catalog);
                }
                started = true;
                current.obsolete = obsolete;
                current.msgid = unquote(rest, line_number)?;
                current.linenum = line_number;
                field = Field::Msgid;
            }
            "msgid_plural" => {
                current.msgid_plural = Some(unquote(rest, line_number)?);
                field = Field::MsgidPlural;
            }
            "msgstr" => {
                current.msgstr = unquote(rest, line_number)?;
                field = Field::Msgstr;
            }
            keyword if keyword.starts_with("msgstr[") => {
                let index: usize = keyword
                    .trim_start_matches("msgstr[")
                    .trim_end_matches(']')
                    .parse()
                    .map_err(|_| parse_error(line_number, "bad plural index"))?;
                if current.msgstr_plural.len() <= index {
                    current.msgstr_plural.resize(index + 1, String::new());
                }
                current.msgstr_plural[index] = unquote(rest, line_number)?;
                field = Field::MsgstrPlural(index);
            }
            "" => {
                let continuation = unquote(rest, line_number)?;
                match field {
                    Field::Msgctxt => {
                        if let Some(ctx) = current.msgctxt.as_mut() {
                            ctx.push_str(&continuation);
                        }
                    }
                    Field::Msgid => current.msgid.push_str(&continuation),
                    Field::MsgidPlural => {
                        if let Some(plural) = current.msgid_plural.as_mut() {
                            plural.push_str(&continuation);
                        }
                    }
                    Field::Msgstr => current.msgstr.push_str(&continuation),
                    Field::MsgstrPlural(i) => current.msgstr_plural[i].push_str(&continuation),
                    Field::None => return Err(parse_error(line_number, "unexpected string")),
                }
            }
            other => {
                return Err(parse_error(
                    line_number,
                    &format!("unknown keyword '{}'", other),
                ))
            }
        }
    }

    finish(current, started, &mut catalog);
    Ok(catalog)
}

fn unquote(raw: &str, line_number: usize) -> Result<String> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| parse_error(line_number, "expected quoted string"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

fn parse_error(line_number: usize, problem: &str) -> Error {
    Error::validation_invalid_argument(
        "catalog",
        format!("Syntax error at line {}: {}", line_number, problem),
        None,
        None,
    )
}

const MO_MAGIC_LE: u32 = 0x9504_12de;
const MO_MAGIC_BE: u32 = 0xde12_0495;

/// Parse a compiled MO catalog.
pub fn parse_mo(bytes: &[u8]) -> Result<Catalog> {
    let invalid = |problem: &str| {
        Error::validation_invalid_argument("catalog", format!("Invalid MO file: {}", problem), None, None)
    };

    let read = |offset: usize, little: bool| -> Option<u32> {
        let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
        Some(if little {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    };

    let magic = read(0, true).ok_or_else(|| invalid("too short"))?;
    let little = match magic {
        MO_MAGIC_LE => true,
        MO_MAGIC_BE => false,
        _ => return Err(invalid("bad magic number")),
    };

    let header = |offset: usize| read(offset, little).map(|v| v as usize);
    let count = header(8).ok_or_else(|| invalid("missing count"))?;
    let originals = header(12).ok_or_else(|| invalid("missing table"))?;
    let translations = header(16).ok_or_else(|| invalid("missing table"))?;

    let string_at = |table: usize, index: usize| -> Option<String> {
        let length = header(table + index * 8)?;
        let offset = header(table + index * 8 + 4)?;
        let raw = bytes.get(offset..offset + length)?;
        Some(String::from_utf8_lossy(raw).to_string())
    };

    let mut catalog = Catalog::default();
    for index in 0..count {
        let original = string_at(originals, index).ok_or_else(|| invalid("truncated string"))?;
        let translation =
            string_at(translations, index).ok_or_else(|| invalid("truncated string"))?;
        if original.is_empty() {
            continue;
        }

        let (msgctxt, id_part) = match original.split_once('\u{4}') {
            Some((ctx, rest)) => (Some(ctx.to_string()), rest.to_string()),
            None => (None, original),
        };

        let mut entry = CatalogEntry {
            msgctxt,
            ..CatalogEntry::default()
        };
        match id_part.split_once('\0') {
            Some((singular, plural)) => {
                entry.msgid = singular.to_string();
                entry.msgid_plural = Some(plural.to_string());
                entry.msgstr_plural = translation.split('\0').map(|s| s.to_string()).collect();
            }
            None => {
                entry.msgid = id_part;
                entry.msgstr = translation;
            }
        }
        catalog.entries.push(entry);
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# German translation
msgid ""
msgstr ""
"Content-Type: text/plain; charset=UTF-8\n"

#: src/main.c:10 src/util.c:4
msgid "Hello"
msgstr "Hallo"

#: src/main.c:12
#, fuzzy, c-format
msgid "Bye %s"
msgstr "Tschuess %s"

#: src/main.c:20
msgid ""
"multi "
"line"
msgstr ""

msgctxt "menu"
msgid "File"
msgid_plural "Files"
msgstr[0] "Datei"
msgstr[1] "Dateien"

#~ msgid "Old"
#~ msgstr "Alt"
"#;

    #[test]
    fn po_counts_match_gettext_semantics() {
        let catalog = parse_po(SAMPLE).unwrap();
        assert_eq!(catalog.entries.len(), 5);
        assert_eq!(catalog.translated_entries().len(), 2);
        assert_eq!(catalog.untranslated_entries().len(), 1);
        assert_eq!(catalog.fuzzy_entries().len(), 1);

        let untranslated = catalog.untranslated_entries()[0];
        assert_eq!(untranslated.msgid, "multi line");
        assert_eq!(untranslated.linenum, 16);
        assert_eq!(untranslated.occurrences, vec![("src/main.c".to_string(), "20".to_string())]);

        let obsolete = catalog.entries.iter().find(|e| e.obsolete).unwrap();
        assert_eq!(obsolete.msgid, "Old");
    }

    #[test]
    fn po_syntax_errors_are_reported() {
        assert!(parse_po("msgid Hello\nmsgstr \"x\"\n").is_err());
        assert!(parse_po("bogus \"x\"\n").is_err());
    }

    fn build_mo(pairs: &[(&str, &str)]) -> Vec<u8> {
        let n = pairs.len();
        let originals_at = 28;
        let translations_at = originals_at + n * 8;
        let mut data_at = translations_at + n * 8;
        let mut tables = vec![0u8; 0];
        let mut strings = Vec::new();
        let mut orig_table = Vec::new();
        let mut trans_table = Vec::new();
        for (original, _) in pairs {
            orig_table.extend((original.len() as u32).to_le_bytes());
            orig_table.extend((data_at as u32).to_le_bytes());
            strings.extend(original.as_bytes());
            strings.push(0);
            data_at += original.len() + 1;
        }
        for (_, translation) in pairs {
            trans_table.extend((translation.len() as u32).to_le_bytes());
            trans_table.extend((data_at as u32).to_le_bytes());
            strings.extend(translation.as_bytes());
            strings.push(0);
            data_at += translation.len() + 1;
        }
        for value in [MO_MAGIC_LE, 0, n as u32, originals_at as u32, translations_at as u32, 0, 0] {
            tables.extend(value.to_le_bytes());
        }
        tables.extend(orig_table);
        tables.extend(trans_table);
        tables.extend(strings);
        tables
    }

    #[test]
    fn mo_entries_skip_header() {
        let bytes = build_mo(&[("", "Content-Type: text/plain\n"), ("Hello", "Hallo"), ("Empty", "")]);
        let catalog = parse_mo(&bytes).unwrap();
        assert_eq!(catalog.entries.len(), 2);
        assert_eq!(catalog.translated_entries().len(), 1);
        assert_eq!(catalog.untranslated_entries().len(), 1);
    }

    #[test]
    fn mo_rejects_bad_magic() {
        assert!(parse_mo(&[0u8; 32]).is_err());
    }
}
