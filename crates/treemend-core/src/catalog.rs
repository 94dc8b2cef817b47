//! Built-in corruption signatures and rule table.
//!
//! These target punctuation damage typical of bulk regex edits on
//! TypeScript/JavaScript sources: statement terminators (`;`) landing where
//! list separators (`,`) or nothing belong. Every rule removes or swaps the
//! exact token its pattern anchors on, so each is a no-op on its own output.
//!
//! Application order (lowest priority first):
//! 1. import-list repair, so later punctuation rules see a sane header
//! 2. `;` → `,` between object properties, before
//! 3. dropping `;` ahead of a closing brace, so a property in the middle of
//!    an object is never mistaken for the last one
//! 4. remaining separators and call/array punctuation

use crate::domain::rule::{RuleProfile, RuleSpec};
use crate::domain::signature::{MatcherSpec, SignatureSpec, Strength};

/// A literal value on the right of `key:`.
const LITERAL: &str = r#"(?:'[^'\n]*'|"[^"\n]*"|-?\d+(?:\.\d+)?|true|false|null)"#;

/// An identifier used as an object key.
const KEY: &str = r"[A-Za-z_$][\w$]*";

const SCRIPT_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];

pub const SIG_IMPORT_BRACE_SEMICOLON: &str = "import-brace-semicolon";
pub const SIG_CONFLICT_MARKER: &str = "conflict-marker";
pub const SIG_DUPLICATE_DEFAULT_EXPORT: &str = "duplicate-default-export";
pub const SIG_UNBALANCED_DELIMITERS: &str = "unbalanced-delimiters";
pub const SIG_PROPERTY_SEMICOLON_SEPARATOR: &str = "property-semicolon-separator";
pub const SIG_PROPERTY_SEMICOLON_BEFORE_BRACE: &str = "property-semicolon-before-brace";
pub const SIG_SEMICOLON_BEFORE_COMMA: &str = "semicolon-before-comma";
pub const SIG_CALL_ARGS_BRACE_SEMICOLON: &str = "call-args-brace-semicolon";
pub const SIG_DOUBLED_SEMICOLON: &str = "doubled-semicolon";
pub const SIG_ARRAY_SEMICOLON: &str = "array-semicolon";

fn property_separator_pattern() -> String {
    format!(r"(\b{KEY}\s*:\s*{LITERAL})[ \t]*;([ \t]*\r?\n[ \t]*{KEY}\s*:)")
}

fn property_before_brace_pattern() -> String {
    format!(r"(\b{KEY}\s*:\s*{LITERAL})[ \t]*;(\s*\}})")
}

pub fn builtin_signatures() -> Vec<SignatureSpec> {
    vec![
        SignatureSpec::pattern(
            SIG_IMPORT_BRACE_SEMICOLON,
            Strength::Strong,
            "semicolon inside an import specifier list",
            r"import\s+(?:type\s+)?\{[^}]*;[^}]*\}\s*from",
        ),
        SignatureSpec::pattern(
            SIG_CONFLICT_MARKER,
            Strength::Strong,
            "leftover merge conflict marker",
            r"^(?:<{7}|={7}|>{7})(?:[ \t].*)?$",
        ),
        SignatureSpec::pattern(
            SIG_DUPLICATE_DEFAULT_EXPORT,
            Strength::Strong,
            "more than one default export",
            r"(?s)\bexport\s+default\b.*\bexport\s+default\b",
        ),
        SignatureSpec {
            id: SIG_UNBALANCED_DELIMITERS.to_string(),
            description: "brackets, braces or parens do not balance".to_string(),
            strength: Strength::Strong,
            matcher: MatcherSpec::Unbalanced { min_imbalance: 1 },
        },
        SignatureSpec::pattern(
            SIG_PROPERTY_SEMICOLON_SEPARATOR,
            Strength::Weak,
            "semicolon separating object properties",
            &property_separator_pattern(),
        ),
        SignatureSpec::pattern(
            SIG_PROPERTY_SEMICOLON_BEFORE_BRACE,
            Strength::Weak,
            "semicolon after the last object property",
            &property_before_brace_pattern(),
        ),
        SignatureSpec::pattern(
            SIG_SEMICOLON_BEFORE_COMMA,
            Strength::Weak,
            "semicolon immediately followed by a comma",
            r";[ \t]*,",
        ),
        SignatureSpec::pattern(
            SIG_CALL_ARGS_BRACE_SEMICOLON,
            Strength::Weak,
            "semicolon between an object argument and the closing paren",
            r"\}[ \t]*;[ \t]*\)",
        ),
        SignatureSpec::pattern(
            SIG_DOUBLED_SEMICOLON,
            Strength::Weak,
            "doubled statement terminator",
            r";{2,}[ \t]*\r?$",
        ),
        SignatureSpec::pattern(
            SIG_ARRAY_SEMICOLON,
            Strength::Weak,
            "semicolon inside an array literal",
            &format!(r"{LITERAL}[ \t]*;[ \t]*(?:\]|{LITERAL}[ \t]*[,\]])"),
        ),
    ]
}

fn rule(
    id: &str,
    priority: i32,
    profile: RuleProfile,
    description: &str,
    pattern: &str,
    replacement: &str,
) -> RuleSpec {
    RuleSpec {
        id: id.to_string(),
        description: description.to_string(),
        priority,
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
        extensions: SCRIPT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        requires_signature: None,
        profile,
    }
}

pub fn builtin_rules() -> Vec<RuleSpec> {
    let mut import_rule = rule(
        "import-brace-semicolon",
        10,
        RuleProfile::Smart,
        "turn `;` inside an import list into `,`",
        r"(import\s+(?:type\s+)?\{[^};]*);([^}]*\}\s*from)",
        "${1},${2}",
    );
    import_rule.requires_signature = Some(SIG_IMPORT_BRACE_SEMICOLON.to_string());

    let mut doubled = rule(
        "doubled-semicolon",
        60,
        RuleProfile::Aggressive,
        "collapse `;;` at end of line",
        r";{2,}([ \t]*\r?)$",
        ";${1}",
    );
    doubled.requires_signature = Some(SIG_DOUBLED_SEMICOLON.to_string());

    vec![
        import_rule,
        rule(
            "property-semicolon-separator",
            20,
            RuleProfile::Smart,
            "turn `;` between object properties into `,`",
            &property_separator_pattern(),
            "${1},${2}",
        ),
        rule(
            "trailing-semicolon-before-brace",
            30,
            RuleProfile::Smart,
            "drop `;` after the last object property",
            &property_before_brace_pattern(),
            "${1}${2}",
        ),
        rule(
            "semicolon-before-comma",
            40,
            RuleProfile::Smart,
            "drop `;` directly before `,`",
            r";([ \t]*,)",
            "${1}",
        ),
        rule(
            "call-args-brace-semicolon",
            50,
            RuleProfile::Smart,
            "drop `;` between `}` and `)`",
            r"\}[ \t]*;([ \t]*\))",
            "}${1}",
        ),
        doubled,
        rule(
            "array-trailing-semicolon",
            70,
            RuleProfile::Aggressive,
            "drop `;` after the last array element",
            &format!(r"({LITERAL})[ \t]*;([ \t]*\])"),
            "${1}${2}",
        ),
        rule(
            "array-element-semicolon",
            80,
            RuleProfile::Aggressive,
            "turn `;` between array elements into `,`",
            &format!(r"({LITERAL})[ \t]*;([ \t]*{LITERAL}[ \t]*[,\]])"),
            "${1},${2}",
        ),
    ]
}
