//! Tolerant symbol scanner for OpenEdge ABL source.
//!
//! This is not a full ABL grammar. Declarations are recognized line by line
//! with explicit resynchronization at every line boundary, so a syntax error
//! anywhere in the file never prevents extraction of the well-formed
//! declarations around it. Kind inference is heuristic: it distinguishes
//! declarations that introduce a named, completion-relevant entity from
//! incidental identifier occurrences, nothing more.

use lazy_static::lazy_static;
use regex::Regex;

use crate::cancel::CancelFlag;

/// Closed set of symbol kinds the scanner can recover. Best-effort: the kind
/// reflects the surrounding syntax, not a semantic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseItemKind {
    Class,
    Constructor,
    Method,
    Enum,
    EnumMember,
    Function,
    Interface,
    Namespace,
    Object,
    Property,
    Variable,
    File,
    Event,
    TypeParameter,
}

/// One recovered symbol. Produced fresh per parse, never mutated.
/// `line` is zero-based and defaults to 0 when the declaration could not be
/// located; consumers must treat 0 as "unlocated" where that matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseItem {
    pub name: String,
    pub kind: ParseItemKind,
    pub line: u32,
}

lazy_static! {
    static ref CLASS_RE: Regex =
        Regex::new(r"(?i)^\s*CLASS\s+([A-Za-z][\w.\-]*)").unwrap();
    static ref INTERFACE_RE: Regex =
        Regex::new(r"(?i)^\s*INTERFACE\s+([A-Za-z][\w.\-]*)").unwrap();
    static ref ENUM_RE: Regex =
        Regex::new(r"(?i)^\s*ENUM\s+([A-Za-z][\w.\-]*)").unwrap();
    static ref ENUM_MEMBER_RE: Regex =
        Regex::new(r"(?i)^\s*DEFINE\s+ENUM\s+(.+)").unwrap();
    static ref END_RE: Regex = Regex::new(r"(?i)^\s*END\b").unwrap();
    static ref CONSTRUCTOR_RE: Regex = Regex::new(
        r"(?i)^\s*CONSTRUCTOR\s+(?:(?:PUBLIC|PROTECTED|PRIVATE|STATIC)\s+)*([A-Za-z][\w\-]*)\s*\(",
    )
    .unwrap();
    static ref METHOD_RE: Regex = Regex::new(
        r"(?i)^\s*METHOD\s+(?:(?:PUBLIC|PROTECTED|PRIVATE|PACKAGE-PROTECTED|PACKAGE-PRIVATE|STATIC|ABSTRACT|OVERRIDE|FINAL)\s+)*(?:[A-Za-z][\w.\-]*(?:\s+EXTENT(?:\s+\d+)?)?\s+)([A-Za-z][\w\-]*)\s*\(",
    )
    .unwrap();
    static ref FUNCTION_RE: Regex =
        Regex::new(r"(?i)^\s*FUNCTION\s+([A-Za-z][\w\-]*)\s+RETURNS\b").unwrap();
    static ref PROCEDURE_RE: Regex =
        Regex::new(r"(?i)^\s*PROCEDURE\s+([A-Za-z][\w.\-]*)").unwrap();
    static ref DEFINE_RE: Regex = Regex::new(
        r"(?i)^\s*DEF(?:INE)?\s+(?:(?:NEW|GLOBAL|SHARED|PRIVATE|PROTECTED|PUBLIC|PACKAGE-PROTECTED|PACKAGE-PRIVATE|STATIC|ABSTRACT|OVERRIDE|SERIALIZABLE|NON-SERIALIZABLE|INPUT-OUTPUT|INPUT|OUTPUT|RETURN)\s+)*(TEMP-TABLE|WORK-TABLE|VARIABLE|VAR|PARAMETER|PROPERTY|EVENT|BUFFER|STREAM|DATASET|QUERY|FRAME)\s+([A-Za-z][\w\-]*)",
    )
    .unwrap();
    static ref USING_RE: Regex =
        Regex::new(r"(?i)^\s*USING\s+([A-Za-z][\w.\-]*)").unwrap();
    static ref INCLUDE_RE: Regex =
        Regex::new(r"\{\s*([\w\-./\\]+\.[iI])\b").unwrap();
}

/// Scan a document for symbol declarations.
///
/// Returns the declarations in source order. Never fails: unparseable input
/// simply contributes nothing, and a signaled cancellation flag makes the
/// scan stop at the next line boundary and return the partial result.
pub fn parse_document(text: &str, cancel: &CancelFlag) -> Vec<ParseItem> {
    let scrubbed = scrub(text);
    let mut items = Vec::new();
    let mut in_enum = false;

    for (line_no, line) in scrubbed.lines().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        scan_line(line, line_no as u32, &mut in_enum, &mut items);
    }

    items
}

fn scan_line(line: &str, line_no: u32, in_enum: &mut bool, items: &mut Vec<ParseItem>) {
    // Include references can share a line with anything else.
    for caps in INCLUDE_RE.captures_iter(line) {
        push(items, &caps[1], ParseItemKind::File, line_no);
    }

    if *in_enum {
        if let Some(caps) = ENUM_MEMBER_RE.captures(line) {
            for member in enum_member_names(&caps[1]) {
                push(items, &member, ParseItemKind::EnumMember, line_no);
            }
            return;
        }
        if END_RE.is_match(line) {
            *in_enum = false;
            return;
        }
    }

    if let Some(caps) = CLASS_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Class, line_no);
    } else if let Some(caps) = INTERFACE_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Interface, line_no);
    } else if let Some(caps) = ENUM_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Enum, line_no);
        *in_enum = true;
    } else if let Some(caps) = CONSTRUCTOR_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Constructor, line_no);
    } else if let Some(caps) = METHOD_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Method, line_no);
    } else if let Some(caps) = FUNCTION_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Function, line_no);
    } else if let Some(caps) = PROCEDURE_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Function, line_no);
    } else if let Some(caps) = DEFINE_RE.captures(line) {
        push(items, &caps[2], define_kind(&caps[1]), line_no);
    } else if let Some(caps) = USING_RE.captures(line) {
        push(items, &caps[1], ParseItemKind::Namespace, line_no);
    }
}

fn push(items: &mut Vec<ParseItem>, raw: &str, kind: ParseItemKind, line: u32) {
    let name = raw.trim_end_matches('.');
    if !name.is_empty() {
        items.push(ParseItem {
            name: name.to_string(),
            kind,
            line,
        });
    }
}

fn define_kind(keyword: &str) -> ParseItemKind {
    match keyword.to_ascii_uppercase().as_str() {
        "PROPERTY" => ParseItemKind::Property,
        "EVENT" => ParseItemKind::Event,
        "TEMP-TABLE" | "WORK-TABLE" | "BUFFER" | "DATASET" => ParseItemKind::Object,
        // VARIABLE, VAR, PARAMETER, STREAM, QUERY, FRAME
        _ => ParseItemKind::Variable,
    }
}

/// Member list of a `DEFINE ENUM` statement. Members may carry explicit
/// values (`Red Green = 3 Blue.`); the value tokens are skipped.
fn enum_member_names(list: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut skip_next = false;

    for token in list.split_whitespace() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if token == "=" {
            skip_next = true;
            continue;
        }
        let token = match token.split_once('=') {
            Some((name, value)) => {
                if value.is_empty() {
                    skip_next = true;
                }
                name
            }
            None => token,
        };
        let name = token.trim_end_matches(['.', ',']);
        if !name.is_empty() && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            names.push(name.to_string());
        }
    }

    names
}

/// Blank out comments and string literals, preserving line structure and
/// character positions, so the declaration patterns never fire on
/// commented-out or quoted text. ABL block comments nest; `~` escapes the
/// next character inside a string.
fn scrub(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut depth = 0usize;
    let mut line_comment = false;
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if c == '\n' {
            // Strings do not span lines; an unterminated quote is dropped at
            // the line break so it cannot blank the rest of the file.
            line_comment = false;
            quote = None;
            out.push('\n');
            continue;
        }
        if line_comment {
            out.push(' ');
            continue;
        }
        if depth > 0 {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                depth -= 1;
                out.push_str("  ");
            } else if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                depth += 1;
                out.push_str("  ");
            } else {
                out.push(' ');
            }
            continue;
        }
        if let Some(q) = quote {
            if c == '~' {
                out.push(' ');
                if let Some(escaped) = chars.next() {
                    out.push(if escaped == '\n' { '\n' } else { ' ' });
                }
                continue;
            }
            if c == q {
                quote = None;
            }
            out.push(' ');
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                depth = 1;
                out.push_str("  ");
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                line_comment = true;
                out.push_str("  ");
            }
            '\'' | '"' => {
                quote = Some(c);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ParseItem> {
        parse_document(text, &CancelFlag::new())
    }

    #[test]
    fn test_class_and_method_extraction() {
        let source = "CLASS Foo: \n  METHOD VOID Bar(): \n  END METHOD.\nEND CLASS.";
        let items = parse(source);

        assert!(items.len() >= 2);
        assert_eq!(items[0].name, "Foo");
        assert_eq!(items[0].kind, ParseItemKind::Class);
        assert_eq!(items[0].line, 0);
        assert_eq!(items[1].name, "Bar");
        assert_eq!(items[1].kind, ParseItemKind::Method);
        assert_eq!(items[1].line, 1);
    }

    #[test]
    fn test_dotted_class_name() {
        let items = parse("CLASS Acme.Billing.Invoice INHERITS Acme.Base:\nEND CLASS.");
        assert_eq!(items[0].name, "Acme.Billing.Invoice");
        assert_eq!(items[0].kind, ParseItemKind::Class);
    }

    #[test]
    fn test_interface_and_constructor() {
        let source = "INTERFACE IShape:\nEND INTERFACE.\n\
                      CLASS Circle IMPLEMENTS IShape:\n\
                      CONSTRUCTOR PUBLIC Circle(radius AS DECIMAL):\n\
                      END CONSTRUCTOR.\nEND CLASS.";
        let items = parse(source);

        let kinds: Vec<_> = items.iter().map(|i| (i.name.as_str(), i.kind)).collect();
        assert!(kinds.contains(&("IShape", ParseItemKind::Interface)));
        assert!(kinds.contains(&("Circle", ParseItemKind::Class)));
        assert!(kinds.contains(&("Circle", ParseItemKind::Constructor)));
    }

    #[test]
    fn test_method_with_modifiers_and_dotted_return_type() {
        let items = parse("METHOD PUBLIC STATIC Progress.Lang.Object Clone():");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Clone");
        assert_eq!(items[0].kind, ParseItemKind::Method);
    }

    #[test]
    fn test_function_and_procedure() {
        let source = "FUNCTION addTwo RETURNS INTEGER (a AS INTEGER):\nEND FUNCTION.\n\
                      PROCEDURE calc-total:\nEND PROCEDURE.";
        let items = parse(source);

        assert_eq!(items[0].name, "addTwo");
        assert_eq!(items[0].kind, ParseItemKind::Function);
        assert_eq!(items[1].name, "calc-total");
        assert_eq!(items[1].kind, ParseItemKind::Function);
    }

    #[test]
    fn test_define_statements() {
        let source = "\
DEFINE VARIABLE cName AS CHARACTER NO-UNDO.
DEFINE INPUT PARAMETER ip-id AS INTEGER NO-UNDO.
DEFINE PRIVATE PROPERTY Total AS DECIMAL GET. SET.
DEFINE PUBLIC EVENT Changed SIGNATURE VOID ().
DEFINE TEMP-TABLE ttOrder NO-UNDO FIELD id AS INTEGER.
DEFINE BUFFER bCustomer FOR Customer.
DEF VAR i AS INT NO-UNDO.";
        let items = parse(source);

        let expected = [
            ("cName", ParseItemKind::Variable),
            ("ip-id", ParseItemKind::Variable),
            ("Total", ParseItemKind::Property),
            ("Changed", ParseItemKind::Event),
            ("ttOrder", ParseItemKind::Object),
            ("bCustomer", ParseItemKind::Object),
            ("i", ParseItemKind::Variable),
        ];
        assert_eq!(items.len(), expected.len());
        for (item, (name, kind)) in items.iter().zip(expected) {
            assert_eq!(item.name, name);
            assert_eq!(item.kind, kind);
        }
    }

    #[test]
    fn test_enum_with_members() {
        let source = "ENUM Color:\n  DEFINE ENUM Red Green = 3 Blue.\nEND ENUM.";
        let items = parse(source);

        assert_eq!(items[0].name, "Color");
        assert_eq!(items[0].kind, ParseItemKind::Enum);
        let members: Vec<_> = items[1..].iter().map(|i| i.name.as_str()).collect();
        assert_eq!(members, vec!["Red", "Green", "Blue"]);
        assert!(items[1..]
            .iter()
            .all(|i| i.kind == ParseItemKind::EnumMember));
    }

    #[test]
    fn test_using_and_include() {
        let source = "USING Progress.Lang.*.\n{includes/defs.i}\nDEFINE VARIABLE x AS INTEGER.";
        let items = parse(source);

        assert_eq!(items[0].name, "Progress.Lang");
        assert_eq!(items[0].kind, ParseItemKind::Namespace);
        assert_eq!(items[1].name, "includes/defs.i");
        assert_eq!(items[1].kind, ParseItemKind::File);
        assert_eq!(items[2].kind, ParseItemKind::Variable);
    }

    #[test]
    fn test_case_insensitive_keywords() {
        let items = parse("class Foo:\n  method void bar():\nend class.");
        assert_eq!(items[0].kind, ParseItemKind::Class);
        assert_eq!(items[1].kind, ParseItemKind::Method);
    }

    #[test]
    fn test_garbage_between_declarations_is_skipped() {
        let source = "DEFINE VARIABLE a AS INTEGER.\n\
                      ]]]] this is (((( not ABL at all\n\
                      DEFINE VARIABLE b AS INTEGER.";
        let items = parse(source);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "a");
        assert_eq!(items[1].name, "b");
    }

    #[test]
    fn test_commented_out_declarations_are_ignored() {
        let source = "/* DEFINE VARIABLE hidden AS INTEGER. */\n\
                      // DEFINE VARIABLE alsoHidden AS INTEGER.\n\
                      /* outer /* nested CLASS Ghost: */ still comment */\n\
                      DEFINE VARIABLE visible AS INTEGER.";
        let items = parse(source);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "visible");
        assert_eq!(items[0].line, 3);
    }

    #[test]
    fn test_quoted_declarations_are_ignored() {
        let source = "MESSAGE \"DEFINE VARIABLE fake AS INTEGER.\" VIEW-AS ALERT-BOX.\n\
                      DEFINE VARIABLE real AS INTEGER.";
        let items = parse(source);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "real");
    }

    #[test]
    fn test_items_in_source_order() {
        let source = "DEFINE VARIABLE z AS INTEGER.\n\
                      PROCEDURE first:\nEND PROCEDURE.\n\
                      DEFINE VARIABLE a AS INTEGER.\n\
                      PROCEDURE second:\nEND PROCEDURE.";
        let items = parse(source);

        let lines: Vec<_> = items.iter().map(|i| i.line).collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_duplicate_names_all_surface() {
        let source = "DEFINE VARIABLE x AS INTEGER.\nPROCEDURE p:\n  DEFINE VARIABLE x AS CHARACTER.\nEND PROCEDURE.";
        let items = parse(source);

        let xs = items.iter().filter(|i| i.name == "x").count();
        assert_eq!(xs, 2);
    }

    #[test]
    fn test_cancelled_scan_returns_partial_result() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let items = parse_document("DEFINE VARIABLE x AS INTEGER.", &cancel);
        assert!(items.is_empty());
    }

    #[test]
    fn test_empty_document() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_end_statements_are_not_declarations() {
        let items = parse("CLASS Foo:\nEND CLASS.\nEND PROCEDURE.\nEND.");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Foo");
    }
}
