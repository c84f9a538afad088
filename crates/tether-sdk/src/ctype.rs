//! Native type declaration grammar
//!
//! Parses the C declaration subset used to describe foreign value layouts:
//! primitive types, pointers, fixed arrays, `struct`/`union` aggregates and
//! typedefs. The parser produces a syntax tree only; names are resolved and
//! layouts computed by the registry.

use logos::Logos;

use crate::error::{MarshalError, MarshalResult};

/// Logos-based token enum for declaration strings.
#[derive(Logos, Debug, Clone, PartialEq)]
enum Tok {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*", skip_block_comment)]
    BlockComment,

    #[token("struct")]
    Struct,

    #[token("union")]
    Union,

    #[token("enum")]
    Enum,

    #[token("typedef")]
    Typedef,

    #[token("const")]
    Const,

    #[token("volatile")]
    Volatile,

    #[token("signed")]
    Signed,

    #[token("unsigned")]
    Unsigned,

    #[token("char")]
    Char,

    #[token("short")]
    Short,

    #[token("int")]
    Int,

    #[token("long")]
    Long,

    #[token("float")]
    Float,

    #[token("double")]
    Double,

    #[token("void")]
    Void,

    #[token("bool")]
    #[token("_Bool")]
    Bool,

    // Identifiers (must come after keywords)
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    #[regex(r"[0-9]+", parse_dec)]
    Number(u64),

    #[token("*")]
    Star,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(";")]
    Semi,

    #[token(",")]
    Comma,
}

fn skip_block_comment(lex: &mut logos::Lexer<Tok>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn parse_hex(lex: &mut logos::Lexer<Tok>) -> Option<u64> {
    u64::from_str_radix(&lex.slice()[2..], 16).ok()
}

fn parse_dec(lex: &mut logos::Lexer<Tok>) -> Option<u64> {
    lex.slice().parse().ok()
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(name) => format!("'{}'", name),
        Tok::Number(n) => format!("'{}'", n),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Syntax tree
// ============================================================================

/// Built-in arithmetic and void types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    /// void
    Void,
    /// bool / _Bool
    Bool,
    /// plain char
    Char,
    /// Integer of the given byte width
    Int {
        /// Width in bytes
        size: u8,
        /// Signedness
        signed: bool,
    },
    /// float
    Float,
    /// double
    Double,
}

/// Aggregate flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    /// struct
    Struct,
    /// union
    Union,
}

impl AggKind {
    /// C keyword
    pub fn keyword(self) -> &'static str {
        match self {
            AggKind::Struct => "struct",
            AggKind::Union => "union",
        }
    }
}

/// Base type of a declaration
#[derive(Debug, Clone, PartialEq)]
pub enum BaseType {
    /// Built-in type
    Prim(Prim),
    /// typedef name
    Named(String),
    /// struct/union reference or definition
    Aggregate {
        /// struct or union
        kind: AggKind,
        /// Tag, if any
        tag: Option<String>,
        /// Member list when the declaration carries a body
        body: Option<Vec<FieldDecl>>,
    },
}

/// Derivation applied on top of the base type, innermost first
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derived {
    /// Pointer; `is_const` qualifies the pointer itself
    Pointer {
        /// `* const`
        is_const: bool,
    },
    /// Fixed-size array
    Array(u64),
}

/// A complete abstract type name
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    /// Base type
    pub base: BaseType,
    /// Base type is const-qualified
    pub base_const: bool,
    /// Pointer and array derivations
    pub derived: Vec<Derived>,
}

/// One member of an aggregate body
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Member name
    pub name: String,
    /// Member type
    pub ty: TypeName,
}

/// Top-level declaration accepted by `declare`
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// `struct tag;` or `struct tag { ... };`
    Aggregate(TypeName),
    /// `typedef <type> name;`
    Typedef {
        /// New type name
        name: String,
        /// Aliased type
        ty: TypeName,
    },
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

fn parse_error(msg: impl Into<String>) -> MarshalError {
    MarshalError::DescriptorParse(msg.into())
}

impl Parser {
    fn new(src: &str) -> MarshalResult<Self> {
        let mut tokens = Vec::new();
        let mut lexer = Tok::lexer(src);
        while let Some(tok) = lexer.next() {
            match tok {
                Ok(tok) => tokens.push(tok),
                Err(_) => {
                    return Err(parse_error(format!("unexpected symbol near '{}'", lexer.slice())))
                }
            }
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> MarshalResult<()> {
        match self.bump() {
            Some(ref got) if got == tok => Ok(()),
            Some(got) => Err(parse_error(format!("expected {:?} near {}", tok, describe(&got)))),
            None => Err(parse_error(format!("expected {:?} at end of input", tok))),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Qualifiers and type specifiers up to the declarator
    fn base_type(&mut self) -> MarshalResult<(BaseType, bool)> {
        let mut is_const = false;
        let mut signedness: Option<bool> = None;
        let mut longs = 0u8;
        let mut short = false;
        let mut word: Option<Tok> = None;
        let mut base: Option<BaseType> = None;

        while let Some(tok) = self.peek().cloned() {
            match tok {
                Tok::Const => is_const = true,
                Tok::Volatile => {}
                Tok::Signed | Tok::Unsigned if signedness.is_none() => {
                    signedness = Some(tok == Tok::Signed)
                }
                Tok::Long if longs < 2 => longs += 1,
                Tok::Short if !short => short = true,
                Tok::Char | Tok::Int | Tok::Float | Tok::Double | Tok::Void | Tok::Bool
                    if word.is_none() && base.is_none() =>
                {
                    word = Some(tok)
                }
                Tok::Struct | Tok::Union if word.is_none() && base.is_none() => {
                    self.pos += 1;
                    let kind = if tok == Tok::Struct {
                        AggKind::Struct
                    } else {
                        AggKind::Union
                    };
                    base = Some(self.aggregate(kind)?);
                    continue;
                }
                Tok::Ident(ref name)
                    if word.is_none()
                        && base.is_none()
                        && signedness.is_none()
                        && longs == 0
                        && !short =>
                {
                    base = Some(BaseType::Named(name.clone()))
                }
                Tok::Enum => return Err(parse_error("enum declarations are not supported")),
                _ => break,
            }
            self.pos += 1;
        }

        if let Some(base) = base {
            if signedness.is_some() || longs > 0 || short {
                return Err(parse_error("invalid type specifier combination"));
            }
            return Ok((base, is_const));
        }

        let prim = match (word, signedness, longs, short) {
            (Some(Tok::Void), None, 0, false) => Prim::Void,
            (Some(Tok::Bool), None, 0, false) => Prim::Bool,
            (Some(Tok::Float), None, 0, false) => Prim::Float,
            (Some(Tok::Double), None, 0, false) => Prim::Double,
            (Some(Tok::Char), None, 0, false) => Prim::Char,
            (Some(Tok::Char), Some(signed), 0, false) => Prim::Int { size: 1, signed },
            (Some(Tok::Int) | None, s, 0, true) => Prim::Int {
                size: 2,
                signed: s.unwrap_or(true),
            },
            (Some(Tok::Int) | None, s, 1 | 2, false) => Prim::Int {
                size: 8,
                signed: s.unwrap_or(true),
            },
            (Some(Tok::Int), s, 0, false) => Prim::Int {
                size: 4,
                signed: s.unwrap_or(true),
            },
            (None, Some(signed), 0, false) => Prim::Int { size: 4, signed },
            (None, None, 0, false) => {
                return Err(match self.peek() {
                    Some(tok) => parse_error(format!("type expected near {}", describe(tok))),
                    None => parse_error("type expected at end of input"),
                })
            }
            _ => return Err(parse_error("invalid type specifier combination")),
        };
        Ok((BaseType::Prim(prim), is_const))
    }

    /// After `struct`/`union`: optional tag, optional body
    fn aggregate(&mut self, kind: AggKind) -> MarshalResult<BaseType> {
        let tag = match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        };

        let body = if self.eat(&Tok::LBrace) {
            let mut fields = Vec::new();
            while !self.eat(&Tok::RBrace) {
                if self.at_end() {
                    return Err(parse_error("'}' expected at end of input"));
                }
                self.member_list(&mut fields)?;
            }
            Some(fields)
        } else {
            None
        };

        if tag.is_none() && body.is_none() {
            return Err(parse_error(format!("{} requires a tag or a body", kind.keyword())));
        }
        Ok(BaseType::Aggregate { kind, tag, body })
    }

    /// `type a, *b, c[4];`
    fn member_list(&mut self, fields: &mut Vec<FieldDecl>) -> MarshalResult<()> {
        let (base, base_const) = self.base_type()?;
        loop {
            let (name, derived) = self.declarator()?;
            let name = name.ok_or_else(|| parse_error("member name expected"))?;
            if fields.iter().any(|f| f.name == name) {
                return Err(parse_error(format!("duplicate member '{}'", name)));
            }
            fields.push(FieldDecl {
                name,
                ty: TypeName {
                    base: base.clone(),
                    base_const,
                    derived,
                },
            });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::Semi)
    }

    /// Pointer stars, optional name, array suffixes
    fn declarator(&mut self) -> MarshalResult<(Option<String>, Vec<Derived>)> {
        let mut derived = Vec::new();
        while self.eat(&Tok::Star) {
            let mut is_const = false;
            loop {
                if self.eat(&Tok::Const) {
                    is_const = true;
                } else if !self.eat(&Tok::Volatile) {
                    break;
                }
            }
            derived.push(Derived::Pointer { is_const });
        }

        let name = match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            Some(Tok::LParen) => {
                return Err(parse_error("function declarations are not supported"))
            }
            _ => None,
        };

        // `int a[2][3]` is an array of 2 arrays of 3: outermost suffix is applied last
        let mut dims = Vec::new();
        while self.eat(&Tok::LBracket) {
            match self.bump() {
                Some(Tok::Number(n)) => dims.push(n),
                Some(tok) => {
                    return Err(parse_error(format!("array size expected near {}", describe(&tok))))
                }
                None => return Err(parse_error("array size expected at end of input")),
            }
            self.expect(&Tok::RBracket)?;
        }
        derived.extend(dims.into_iter().rev().map(Derived::Array));

        if self.peek() == Some(&Tok::LParen) {
            return Err(parse_error("function declarations are not supported"));
        }
        Ok((name, derived))
    }
}

/// Parse a single abstract type name, e.g. `"const char *"` or `"struct request"`
pub fn parse_type_name(src: &str) -> MarshalResult<TypeName> {
    let mut parser = Parser::new(src)?;
    let (base, base_const) = parser.base_type()?;
    let (name, derived) = parser.declarator()?;
    if let Some(name) = name {
        return Err(parse_error(format!("unexpected identifier '{}'", name)));
    }
    if let Some(tok) = parser.peek() {
        return Err(parse_error(format!("unexpected {}", describe(tok))));
    }
    Ok(TypeName {
        base,
        base_const,
        derived,
    })
}

/// Parse a sequence of `;`-terminated declarations
pub fn parse_declarations(src: &str) -> MarshalResult<Vec<Decl>> {
    let mut parser = Parser::new(src)?;
    let mut decls = Vec::new();
    while !parser.at_end() {
        if parser.eat(&Tok::Semi) {
            continue;
        }
        if parser.eat(&Tok::Typedef) {
            let (base, base_const) = parser.base_type()?;
            loop {
                let (name, derived) = parser.declarator()?;
                let name = name.ok_or_else(|| parse_error("typedef name expected"))?;
                decls.push(Decl::Typedef {
                    name,
                    ty: TypeName {
                        base: base.clone(),
                        base_const,
                        derived,
                    },
                });
                if !parser.eat(&Tok::Comma) {
                    break;
                }
            }
        } else {
            let (base, base_const) = parser.base_type()?;
            if !matches!(base, BaseType::Aggregate { .. }) {
                return Err(match parser.peek() {
                    Some(Tok::Ident(name)) => parse_error(format!(
                        "declaration of '{}' is not supported",
                        name
                    )),
                    _ => parse_error("struct, union or typedef expected"),
                });
            }
            decls.push(Decl::Aggregate(TypeName {
                base,
                base_const,
                derived: Vec::new(),
            }));
        }
        parser.expect(&Tok::Semi)?;
    }
    Ok(decls)
}
