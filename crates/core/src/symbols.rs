//! Regex-based symbol and literal extraction.
//!
//! Best-effort, line-oriented pattern matching for definitions across the
//! configured language families, plus extraction of the identifier literals
//! (definitions, references, imports) that feed the literal index. No parse
//! trees; a line either matches a pattern or it doesn't.

use crate::types::{
    Chunk, ExtractedLiteral, ExtractedSymbol, LiteralMatchType, LiteralType, SymbolKind,
};
use crate::vocabulary::{extract_vocabulary, infer_literal_type, matches_identifier_convention};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Language families
// ---------------------------------------------------------------------------

/// How a language family marks a definition as exported/public.
enum ExportRule {
    /// Line must begin (after whitespace) with one of these keyword tokens.
    LineKeyword(&'static [&'static str]),
    /// Exported when the symbol name starts with an uppercase letter (Go).
    CapitalizedName,
    /// Public when the name does not start with an underscore (Python).
    NotUnderscored,
}

struct LanguageSpec {
    extensions: &'static [&'static str],
    patterns: Vec<(Regex, SymbolKind)>,
    export: ExportRule,
}

impl LanguageSpec {
    fn is_exported(&self, line: &str, name: &str) -> bool {
        match self.export {
            ExportRule::LineKeyword(keywords) => {
                let trimmed = line.trim_start();
                keywords.iter().any(|kw| {
                    trimmed.starts_with(kw)
                        && trimmed[kw.len()..]
                            .chars()
                            .next()
                            .is_some_and(|c| !c.is_alphanumeric() && c != '_')
                })
            }
            ExportRule::CapitalizedName => name.starts_with(|c: char| c.is_uppercase()),
            ExportRule::NotUnderscored => !name.starts_with('_'),
        }
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

fn language_specs() -> &'static Vec<LanguageSpec> {
    static SPECS: OnceLock<Vec<LanguageSpec>> = OnceLock::new();
    SPECS.get_or_init(|| {
        vec![
            // TypeScript / JavaScript
            LanguageSpec {
                extensions: &["ts", "tsx", "js", "jsx", "mjs", "cjs"],
                patterns: vec![
                    (
                        re(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+([A-Za-z_$][\w$]*)"),
                        SymbolKind::Function,
                    ),
                    (
                        re(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)"),
                        SymbolKind::Class,
                    ),
                    (re(r"^\s*(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)"), SymbolKind::Interface),
                    (re(r"^\s*(?:export\s+)?type\s+([A-Za-z_$][\w$]*)\s*="), SymbolKind::Type),
                    (
                        re(r"^\s*(?:export\s+)?(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)"),
                        SymbolKind::Enum,
                    ),
                    (
                        re(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)"),
                        SymbolKind::Variable,
                    ),
                    (
                        // Class methods: indented, optional modifiers, name(args) {
                        re(r"^\s+(?:(?:public|private|protected|static|async|readonly|override)\s+)*([A-Za-z_$][\w$]*)\s*\([^;]*\)\s*\{"),
                        SymbolKind::Method,
                    ),
                ],
                export: ExportRule::LineKeyword(&["export"]),
            },
            // Python
            LanguageSpec {
                extensions: &["py", "pyi"],
                patterns: vec![
                    (re(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"), SymbolKind::Function),
                    (re(r"^\s*class\s+([A-Za-z_]\w*)"), SymbolKind::Class),
                    (re(r"^([A-Z][A-Z0-9_]+)\s*="), SymbolKind::Variable),
                ],
                export: ExportRule::NotUnderscored,
            },
            // Go
            LanguageSpec {
                extensions: &["go"],
                patterns: vec![
                    (re(r"^func\s+(?:\([^)]*\)\s+)?([A-Za-z_]\w*)"), SymbolKind::Function),
                    (re(r"^type\s+([A-Za-z_]\w*)\s+struct\b"), SymbolKind::Class),
                    (re(r"^type\s+([A-Za-z_]\w*)\s+interface\b"), SymbolKind::Interface),
                    (re(r"^type\s+([A-Za-z_]\w*)\s"), SymbolKind::Type),
                    (re(r"^(?:var|const)\s+([A-Za-z_]\w*)"), SymbolKind::Variable),
                ],
                export: ExportRule::CapitalizedName,
            },
            // Rust
            LanguageSpec {
                extensions: &["rs"],
                patterns: vec![
                    (
                        re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_]\w*)"),
                        SymbolKind::Function,
                    ),
                    (
                        re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+([A-Za-z_]\w*)"),
                        SymbolKind::Class,
                    ),
                    (
                        re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+([A-Za-z_]\w*)"),
                        SymbolKind::Interface,
                    ),
                    (
                        re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?type\s+([A-Za-z_]\w*)"),
                        SymbolKind::Type,
                    ),
                    (
                        re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+([A-Za-z_]\w*)"),
                        SymbolKind::Enum,
                    ),
                    (
                        re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:static|const)\s+([A-Za-z_]\w*)"),
                        SymbolKind::Variable,
                    ),
                ],
                export: ExportRule::LineKeyword(&["pub"]),
            },
        ]
    })
}

/// Names that look like definitions to the method pattern but are control
/// flow or builtins.
fn keyword_blocklist() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            "if", "else", "for", "while", "switch", "catch", "return", "new", "typeof", "in",
            "of", "do", "try", "throw", "await", "yield", "match", "loop",
        ]
        .iter()
        .copied()
        .collect()
    })
}

// ---------------------------------------------------------------------------
// Symbol extraction
// ---------------------------------------------------------------------------

fn specs_for_extension(ext: &str) -> Vec<&'static LanguageSpec> {
    language_specs().iter().filter(|s| s.extensions.contains(&ext)).collect()
}

/// Extract definition symbols from file content.
///
/// When multiple language families apply to the same extension, the union of
/// matches is taken and duplicates (same name+kind+line) are dropped.
pub fn extract_symbols(filepath: &str, content: &str) -> Vec<ExtractedSymbol> {
    let ext = crate::types::file_extension(filepath);
    let specs = specs_for_extension(ext);
    if specs.is_empty() {
        return Vec::new();
    }

    let mut symbols = Vec::new();
    let mut seen: HashSet<(String, SymbolKind, usize)> = HashSet::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        for spec in &specs {
            // First matching pattern within a family wins; patterns are
            // ordered most-specific first.
            for (pattern, kind) in &spec.patterns {
                let Some(cap) = pattern.captures(line) else { continue };
                let name = cap[1].to_string();
                if keyword_blocklist().contains(name.as_str()) {
                    continue;
                }
                if seen.insert((name.clone(), *kind, line_no)) {
                    symbols.push(ExtractedSymbol {
                        is_exported: spec.is_exported(line, &name),
                        name,
                        kind: *kind,
                        line: line_no,
                    });
                }
                break;
            }
        }
    }

    symbols
}

// ---------------------------------------------------------------------------
// Literal extraction
// ---------------------------------------------------------------------------

fn import_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // import { a, b } from 'pkg' / import x from 'pkg'
            re(r#"^\s*import\s+(?:type\s+)?(.+?)\s+from\s+['"]([^'"]+)['"]"#),
            // const x = require('pkg')
            re(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#),
            // use crate::foo::Bar;
            re(r"^\s*(?:pub\s+)?use\s+([\w:]+)"),
            // from pkg import a, b  /  import pkg
            re(r"^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))"),
        ]
    })
}

fn identifier_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

fn make_literal(value: &str, literal_type: LiteralType, match_type: LiteralMatchType) -> ExtractedLiteral {
    ExtractedLiteral {
        value: value.to_string(),
        literal_type,
        match_type,
        vocabulary: extract_vocabulary(value),
    }
}

/// Extract the literals of one chunk: symbol definitions, imported names, and
/// convention-shaped identifier references. Each value appears once per
/// chunk, kept at its highest-priority match type.
pub fn extract_literals(chunk: &Chunk, symbols: &[ExtractedSymbol]) -> Vec<ExtractedLiteral> {
    let mut literals: Vec<ExtractedLiteral> = Vec::new();
    let mut best: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    let mut push = |lit: ExtractedLiteral, literals: &mut Vec<ExtractedLiteral>| {
        let key = lit.value.to_lowercase();
        match best.get(&key) {
            Some(&i) => {
                if lit.match_type.priority() > literals[i].match_type.priority() {
                    literals[i] = lit;
                }
            }
            None => {
                best.insert(key, literals.len());
                literals.push(lit);
            }
        }
    };

    // Definitions: symbols whose line falls inside this chunk.
    for sym in symbols {
        if sym.line >= chunk.start_line && sym.line <= chunk.end_line {
            push(
                make_literal(&sym.name, sym.kind.literal_type(), LiteralMatchType::Definition),
                &mut literals,
            );
        }
    }

    for line in chunk.content.lines() {
        // Imports
        for pattern in import_patterns() {
            let Some(cap) = pattern.captures(line) else { continue };
            for group in cap.iter().skip(1).flatten() {
                let text = group.as_str();
                if text.starts_with(['\'', '"']) {
                    continue;
                }
                // "{ a, b as c }" / "x" / "a.b.c" / "a::b::C"
                for piece in text
                    .trim_matches(['{', '}', ' '])
                    .split(',')
                    .flat_map(|p| p.split_whitespace().next())
                {
                    let name = piece.rsplit(['.', ':', '/']).next().unwrap_or(piece);
                    if name.len() >= 2 && name != "*" {
                        push(
                            make_literal(name, infer_literal_type(name), LiteralMatchType::Import),
                            &mut literals,
                        );
                    }
                }
            }
        }

        // References: convention-shaped identifiers anywhere on the line.
        for m in identifier_token_re().find_iter(line) {
            let token = m.as_str();
            if matches_identifier_convention(token) {
                push(
                    make_literal(token, infer_literal_type(token), LiteralMatchType::Reference),
                    &mut literals,
                );
            }
        }
    }

    literals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{chunk_id, ChunkType};

    fn chunk_of(filepath: &str, content: &str) -> Chunk {
        let lines = content.lines().count();
        Chunk {
            chunk_id: chunk_id(filepath, 1, lines),
            filepath: filepath.to_string(),
            start_line: 1,
            end_line: lines,
            content: content.to_string(),
            chunk_type: ChunkType::File,
            name: None,
            is_exported: None,
        }
    }

    #[test]
    fn test_extract_typescript_symbols() {
        let src = "export function authenticateUser(name: string) {\n\
                   }\n\
                   export class SessionStore {\n\
                   }\n\
                   interface TokenPair {\n\
                   }\n\
                   const MAX_ATTEMPTS = 3;\n";
        let symbols = extract_symbols("src/auth.ts", src);
        let names: Vec<(&str, SymbolKind, bool)> =
            symbols.iter().map(|s| (s.name.as_str(), s.kind, s.is_exported)).collect();
        assert!(names.contains(&("authenticateUser", SymbolKind::Function, true)));
        assert!(names.contains(&("SessionStore", SymbolKind::Class, true)));
        assert!(names.contains(&("TokenPair", SymbolKind::Interface, false)));
        assert!(names.contains(&("MAX_ATTEMPTS", SymbolKind::Variable, false)));
    }

    #[test]
    fn test_extract_rust_symbols_pub_export() {
        let src = "pub fn parse(input: &str) -> Token {\n\
                   fn helper() {}\n\
                   pub struct Lexer {\n\
                   }\n";
        let symbols = extract_symbols("src/lex.rs", src);
        let parse = symbols.iter().find(|s| s.name == "parse").unwrap();
        assert!(parse.is_exported);
        assert_eq!(parse.line, 1);
        let helper = symbols.iter().find(|s| s.name == "helper").unwrap();
        assert!(!helper.is_exported);
        assert_eq!(symbols.iter().find(|s| s.name == "Lexer").unwrap().kind, SymbolKind::Class);
    }

    #[test]
    fn test_extract_go_symbols_capitalized_export() {
        let src = "func HandleRequest(w http.ResponseWriter) {\n\
                   func helper() {}\n\
                   type Server struct {\n";
        let symbols = extract_symbols("main.go", src);
        assert!(symbols.iter().find(|s| s.name == "HandleRequest").unwrap().is_exported);
        assert!(!symbols.iter().find(|s| s.name == "helper").unwrap().is_exported);
    }

    #[test]
    fn test_extract_python_symbols_underscore_private() {
        let src = "def fetch_user(id):\n\
                   def _internal():\n\
                   class UserRepo:\n";
        let symbols = extract_symbols("repo.py", src);
        assert!(symbols.iter().find(|s| s.name == "fetch_user").unwrap().is_exported);
        assert!(!symbols.iter().find(|s| s.name == "_internal").unwrap().is_exported);
    }

    #[test]
    fn test_unknown_extension_yields_nothing() {
        assert!(extract_symbols("image.png", "export function x() {}").is_empty());
    }

    #[test]
    fn test_control_flow_not_a_method() {
        let src = "class A {\n  if (x) {\n  doWork() {\n}\n";
        let symbols = extract_symbols("a.ts", src);
        assert!(!symbols.iter().any(|s| s.name == "if"));
        assert!(symbols.iter().any(|s| s.name == "doWork" && s.kind == SymbolKind::Method));
    }

    #[test]
    fn test_extract_literals_definition_beats_reference() {
        let src = "export function hashPassword(pw: string) {\n\
                   return hashPassword(pw);\n";
        let chunk = chunk_of("src/auth.ts", src);
        let symbols = extract_symbols("src/auth.ts", src);
        let literals = extract_literals(&chunk, &symbols);
        let hash = literals.iter().find(|l| l.value == "hashPassword").unwrap();
        assert_eq!(hash.match_type, LiteralMatchType::Definition);
        assert_eq!(hash.vocabulary, vec!["hash", "password"]);
    }

    #[test]
    fn test_extract_literals_imports() {
        let src = "import { AuthClient } from './client';\n";
        let chunk = chunk_of("src/index.ts", src);
        let literals = extract_literals(&chunk, &[]);
        let auth = literals.iter().find(|l| l.value == "AuthClient").unwrap();
        // AuthClient also appears as a PascalCase reference on the same line;
        // the import upsert keeps the first entry since reference outranks it.
        assert_eq!(auth.match_type, LiteralMatchType::Reference);
    }

    #[test]
    fn test_extract_literals_references_by_convention() {
        let src = "const url = AUTH_SERVICE_URL + getUserById(userId);\n";
        let chunk = chunk_of("src/x.ts", src);
        let literals = extract_literals(&chunk, &[]);
        let values: Vec<&str> = literals.iter().map(|l| l.value.as_str()).collect();
        assert!(values.contains(&"AUTH_SERVICE_URL"));
        assert!(values.contains(&"getUserById"));
        assert!(values.contains(&"userId"));
        // Plain lowercase "url" is not convention-shaped
        assert!(!values.contains(&"url"));
    }
}
