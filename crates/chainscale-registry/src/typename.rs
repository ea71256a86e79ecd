//! Parser for the Rust type names carried by legacy metadata and chain type
//! bundles.
//!
//! Names are normalised on the way in: trait-qualified paths collapse to
//! the associated type (`<T as Trait<I>>::Balance` → `Balance`), module
//! paths keep their last segment (`T::AccountId` → `AccountId`), and
//! `Box`, `Cow`, references and lifetimes disappear. The [`Display`]
//! output of the result is the canonical signature used as a cache key.
//!
//! [`Display`]: std::fmt::Display

use std::fmt;

use crate::error::ResolutionError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeName {
    Named { name: String, params: Vec<TypeName> },
    Tuple(Vec<TypeName>),
    Array { elem: Box<TypeName>, len: usize },
}

impl TypeName {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ResolutionError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let ty = parser.ty()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }

    /// Bare name with no generic parameters, if this is one.
    pub fn simple_name(&self) -> Option<&str> {
        match self {
            Self::Named { name, params } if params.is_empty() => Some(name),
            _ => None,
        }
    }

    /// Canonical signature string.
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, params } => {
                f.write_str(name)?;
                if !params.is_empty() {
                    f.write_str("<")?;
                    write_list(f, params)?;
                    f.write_str(">")?;
                }
                Ok(())
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Self::Array { elem, len } => write!(f, "[{elem}; {len}]"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeName]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

// ─── Tokens ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(usize),
    Lifetime,
    PathSep,
    Symbol(char),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ResolutionError> {
    let invalid = |reason: String| ResolutionError::InvalidTypeName {
        name: input.to_string(),
        reason,
    };
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            ':' => match chars.next() {
                Some((_, ':')) => tokens.push(Token::PathSep),
                _ => return Err(invalid(format!("lone ':' at {start}"))),
            },
            '\'' => {
                while chars.peek().is_some_and(|(_, c)| c.is_alphanumeric() || *c == '_') {
                    chars.next();
                }
                tokens.push(Token::Lifetime);
            }
            '<' | '>' | '(' | ')' | '[' | ']' | ',' | ';' | '&' => tokens.push(Token::Symbol(c)),
            c if c.is_ascii_digit() => {
                let mut end = start + 1;
                while let Some((i, c)) = chars.peek().copied() {
                    if !(c.is_ascii_digit() || c == '_') {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                let digits: String = input[start..end].chars().filter(|c| *c != '_').collect();
                let n = digits
                    .parse()
                    .map_err(|_| invalid(format!("bad number {digits}")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some((i, c)) = chars.peek().copied() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
            }
            other => return Err(invalid(format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

// ─── Parser ─────────────────────────────────────────────────────────────────

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> ResolutionError {
        ResolutionError::InvalidTypeName {
            name: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: char) -> Result<(), ResolutionError> {
        if self.eat(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{symbol}'")))
        }
    }

    fn ident(&mut self) -> Result<String, ResolutionError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(self.error("expected identifier")),
        }
    }

    fn ty(&mut self) -> Result<TypeName, ResolutionError> {
        match self.peek() {
            Some(Token::Symbol('&')) => {
                self.pos += 1;
                if self.peek() == Some(&Token::Lifetime) {
                    self.pos += 1;
                }
                if matches!(self.peek(), Some(Token::Ident(m)) if m == "mut") {
                    self.pos += 1;
                }
                self.ty()
            }
            Some(Token::Symbol('(')) => {
                self.pos += 1;
                let items = self.list(')')?;
                Ok(match <[TypeName; 1]>::try_from(items) {
                    // `(T)` is just `T`
                    Ok([single]) => single,
                    Err(items) => TypeName::Tuple(items),
                })
            }
            Some(Token::Symbol('[')) => {
                self.pos += 1;
                let elem = self.ty()?;
                if self.eat(']') {
                    // slice
                    return Ok(TypeName::Named {
                        name: "Vec".into(),
                        params: vec![elem],
                    });
                }
                self.expect(';')?;
                let len = match self.next() {
                    Some(Token::Number(n)) => n,
                    _ => return Err(self.error("expected array length")),
                };
                self.expect(']')?;
                Ok(TypeName::Array {
                    elem: Box::new(elem),
                    len,
                })
            }
            Some(Token::Symbol('<')) => self.qualified(),
            Some(Token::Ident(_)) => self.path(),
            _ => Err(self.error("expected a type")),
        }
    }

    /// `<Ty as Trait<..>>::Assoc`, collapsed to the associated name.
    fn qualified(&mut self) -> Result<TypeName, ResolutionError> {
        self.expect('<')?;
        self.ty()?;
        let trait_name = if matches!(self.peek(), Some(Token::Ident(a)) if a == "as") {
            self.pos += 1;
            match self.path()? {
                TypeName::Named { name, .. } => name,
                _ => return Err(self.error("expected trait path")),
            }
        } else {
            String::new()
        };
        self.expect('>')?;
        if self.next() != Some(Token::PathSep) {
            return Err(self.error("expected '::' after qualified path"));
        }
        let assoc = self.ident()?;
        let name = match (trait_name.as_str(), assoc.as_str()) {
            ("StaticLookup", "Source") => "LookupSource".to_string(),
            _ => assoc,
        };
        let params = self.generics()?;
        Ok(TypeName::Named { name, params })
    }

    /// `a::b::Name<..>`; only the last segment survives.
    fn path(&mut self) -> Result<TypeName, ResolutionError> {
        let mut name = self.ident()?;
        let mut params = self.generics()?;
        while self.peek() == Some(&Token::PathSep) {
            self.pos += 1;
            name = self.ident()?;
            params = self.generics()?;
        }
        Ok(match (name.as_str(), params.len()) {
            ("Box" | "Arc" | "Rc" | "Cow", 1) => params.remove(0),
            _ => TypeName::Named { name, params },
        })
    }

    fn generics(&mut self) -> Result<Vec<TypeName>, ResolutionError> {
        if !self.eat('<') {
            return Ok(Vec::new());
        }
        self.list('>')
    }

    /// Comma-separated types up to `close`; lifetimes are dropped.
    fn list(&mut self, close: char) -> Result<Vec<TypeName>, ResolutionError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            if self.peek() == Some(&Token::Lifetime) {
                self.pos += 1;
            } else {
                items.push(self.ty()?);
            }
            if !self.eat(',') {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> String {
        TypeName::parse(s).unwrap().to_string()
    }

    #[test]
    fn strips_module_paths() {
        assert_eq!(canon("T::AccountId"), "AccountId");
        assert_eq!(canon("frame_system::AccountInfo<T::Index, T::AccountData>"), "AccountInfo<Index, AccountData>");
        assert_eq!(canon("Vec<T::Balance>"), "Vec<Balance>");
    }

    #[test]
    fn collapses_qualified_paths() {
        assert_eq!(canon("<T as Trait<I>>::Proposal"), "Proposal");
        assert_eq!(canon("<T::Lookup as StaticLookup>::Source"), "LookupSource");
        assert_eq!(canon("BalanceOf<T, I>"), "BalanceOf<T, I>");
    }

    #[test]
    fn drops_boxes_references_and_lifetimes() {
        assert_eq!(canon("Box<<T as Trait>::Call>"), "Call");
        assert_eq!(canon("&'static [u8]"), "Vec<u8>");
        assert_eq!(canon("Cow<'static, str>"), "str");
        assert_eq!(canon("&'a mut Vec<u8>"), "Vec<u8>");
    }

    #[test]
    fn tuples_and_arrays() {
        assert_eq!(canon("(T::AccountId, Balance)"), "(AccountId, Balance)");
        assert_eq!(canon("()"), "()");
        assert_eq!(canon("(u32)"), "u32");
        assert_eq!(canon("[u8; 32]"), "[u8; 32]");
        assert_eq!(canon("[ u8 ;32 ]"), "[u8; 32]");
        assert_eq!(canon("Vec<(u32, [u8;4])>"), "Vec<(u32, [u8; 4])>");
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["Vec<u8", "[u8; x]", "a:b", "(u8,", "Vec<>>", "", "u8 u16"] {
            assert!(
                matches!(TypeName::parse(bad), Err(ResolutionError::InvalidTypeName { .. })),
                "{bad} should not parse"
            );
        }
    }
}
