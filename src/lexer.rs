use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::tokens::{Axis, Token, TokenKind};

// EQNAME: leading letter, then letters/digits/underscores, with hyphens
// allowed between segments (so `descendant-or-self` is a single word).
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(?:-[A-Za-z0-9_]+)*").unwrap());

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+(?:\.[0-9]*)?").unwrap());

pub type Id<T> = (&'static str, T);

pub static WORD_OPERATORS: [Id<TokenKind>; 15] = [
    ("or", TokenKind::Or),
    ("and", TokenKind::And),
    ("eq", TokenKind::ValueEq),
    ("ne", TokenKind::ValueNe),
    ("lt", TokenKind::ValueLt),
    ("le", TokenKind::ValueLe),
    ("gt", TokenKind::ValueGt),
    ("ge", TokenKind::ValueGe),
    ("is", TokenKind::Is),
    ("div", TokenKind::Div),
    ("idiv", TokenKind::IntegerDiv),
    ("mod", TokenKind::Mod),
    ("union", TokenKind::Union),
    ("intersect", TokenKind::Intersect),
    ("except", TokenKind::Except),
];

pub static AXIS_WORDS: [Id<Axis>; 13] = [
    ("child", Axis::Child),
    ("descendant", Axis::Descendant),
    ("attribute", Axis::Attribute),
    ("self", Axis::SelfAxis),
    ("descendant-or-self", Axis::DescendantOrSelf),
    ("following-sibling", Axis::FollowingSibling),
    ("following", Axis::Following),
    ("namespace", Axis::Namespace),
    ("parent", Axis::Parent),
    ("ancestor", Axis::Ancestor),
    ("preceding-sibling", Axis::PrecedingSibling),
    ("preceding", Axis::Preceding),
    ("ancestor-or-self", Axis::AncestorOrSelf),
];

pub static KIND_WORDS: [Id<TokenKind>; 4] = [
    ("element", TokenKind::KindElement),
    ("attribute", TokenKind::KindAttribute),
    ("node", TokenKind::KindNode),
    ("text", TokenKind::KindText),
];

pub static DOUBLE_CHAR_TOKENS: [Id<TokenKind>; 7] = [
    ("//", TokenKind::DoubleSlash),
    ("::", TokenKind::ColonColon),
    ("..", TokenKind::DotDot),
    ("==", TokenKind::GeneralEq),
    ("!=", TokenKind::GeneralNe),
    ("<=", TokenKind::GeneralLe),
    (">=", TokenKind::GeneralGe),
];

pub static SINGLE_CHAR_TOKENS: [Id<TokenKind>; 19] = [
    ("/", TokenKind::Slash),
    (".", TokenKind::Dot),
    ("@", TokenKind::At),
    ("$", TokenKind::Dollar),
    ("(", TokenKind::LeftParen),
    (")", TokenKind::RightParen),
    ("[", TokenKind::LeftBracket),
    ("]", TokenKind::RightBracket),
    ("{", TokenKind::LeftBrace),
    ("}", TokenKind::RightBrace),
    (",", TokenKind::Comma),
    ("|", TokenKind::Pipe),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("?", TokenKind::Question),
    ("=", TokenKind::GeneralEq),
    ("<", TokenKind::GeneralLt),
    (">", TokenKind::GeneralGt),
];

/// Single-pass tokenizer. The only lookahead is the axis-word rule: an
/// identifier matching an axis name becomes an axis token iff the next
/// token is `::`; the scanned-ahead token is buffered in `pending`.
pub struct Lexer<'s> {
    input: &'s str,
    pos: usize,
    pending: VecDeque<Token>,
}

impl<'s> Lexer<'s> {
    pub fn new(input: &'s str) -> Lexer<'s> {
        Lexer {
            input,
            pos: 0,
            pending: VecDeque::new(),
        }
    }

    /// Offset just past the last consumed byte, for end-of-input errors.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.pending.pop_front() {
            return Ok(Some(token));
        }

        self.scan_token()
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.input.as_bytes();

        while self.pos < bytes.len() && matches!(bytes[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn scan_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        if self.pos >= self.input.len() {
            return Ok(None);
        }

        let rem = &self.input[self.pos..];
        let first = rem.chars().next().unwrap();

        let token = if first.is_ascii_alphabetic() {
            self.scan_word()?
        } else if first == '"' || first == '\'' {
            self.scan_string()?
        } else if first.is_ascii_digit() {
            self.scan_number()?
        } else {
            self.scan_symbol(first)?
        };

        trace!(offset = token.offset, kind = ?token.kind, "lexed token");

        Ok(Some(token))
    }

    fn scan_symbol(&mut self, first: char) -> Result<Token> {
        let rem = &self.input[self.pos..];

        for (lexeme, kind) in DOUBLE_CHAR_TOKENS
            .iter()
            .chain(SINGLE_CHAR_TOKENS.iter())
        {
            if rem.starts_with(lexeme) {
                let token = Token::new(kind.clone(), *lexeme, self.pos);
                self.pos += lexeme.len();
                return Ok(token);
            }
        }

        Err(Error::lex(
            self.pos,
            format!("unrecognised character {first:?}"),
        ))
    }

    fn scan_word(&mut self) -> Result<Token> {
        let rem = &self.input[self.pos..];
        let word = NAME_RE.find(rem).expect("alphabetic start").as_str();
        let offset = self.pos;

        self.pos += word.len();

        for (name, kind) in &WORD_OPERATORS {
            if word == *name {
                return Ok(Token::new(kind.clone(), word, offset));
            }
        }

        if let Some((_, axis)) = AXIS_WORDS.iter().find(|(name, _)| word == *name) {
            // The axis-word rule: peek exactly one token ahead.
            if let Some(next) = self.scan_token()? {
                let is_axis = next.kind == TokenKind::ColonColon;
                self.pending.push_front(next);

                if is_axis {
                    return Ok(Token::new(TokenKind::AxisWord(*axis), word, offset));
                }
            }
        }

        for (name, kind) in &KIND_WORDS {
            if word == *name {
                return Ok(Token::new(kind.clone(), word, offset));
            }
        }

        Ok(Token::new(TokenKind::Name(word.to_string()), word, offset))
    }

    fn scan_string(&mut self) -> Result<Token> {
        let offset = self.pos;
        let mut chars = self.input[self.pos..].char_indices();
        let (_, quote) = chars.next().expect("quote start");

        let mut value = String::new();

        loop {
            let Some((i, c)) = chars.next() else {
                return Err(Error::lex(offset, "unterminated string literal"));
            };

            match c {
                _ if c == quote => {
                    let end = self.pos + i + 1;
                    let lexeme = &self.input[self.pos..end];
                    self.pos = end;
                    return Ok(Token::new(TokenKind::Str(value), lexeme, offset));
                }

                '\n' | '\r' => {
                    return Err(Error::lex(offset, "newline inside string literal"));
                }

                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        return Err(Error::lex(offset, "unterminated string literal"));
                    };

                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        other => value.push(other),
                    }
                }

                other => value.push(other),
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token> {
        let rem = &self.input[self.pos..];
        let lexeme = NUMBER_RE.find(rem).expect("digit start").as_str();
        let offset = self.pos;

        self.pos += lexeme.len();

        let kind = if lexeme.contains('.') {
            let value = lexeme
                .parse::<f64>()
                .map_err(|_| Error::lex(offset, format!("invalid number literal `{lexeme}`")))?;

            TokenKind::Double(value)
        } else {
            let value = lexeme.parse::<i64>().map_err(|_| {
                Error::lex(offset, format!("integer literal `{lexeme}` out of range"))
            })?;

            TokenKind::Integer(value)
        };

        Ok(Token::new(kind, lexeme, offset))
    }
}

impl<'s> Iterator for Lexer<'s> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .collect::<Result<Vec<_>>>()
            .unwrap_or_else(|e| panic!("lexing {input:?} failed: {e}"))
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn name(n: &str) -> TokenKind {
        TokenKind::Name(n.to_string())
    }

    #[test]
    fn single_names_and_slashes() {
        assert_eq!(kinds("a"), vec![name("a")]);
        assert_eq!(kinds("/"), vec![TokenKind::Slash]);
        assert_eq!(kinds("a/b"), vec![name("a"), TokenKind::Slash, name("b")]);
        assert_eq!(kinds("//a"), vec![TokenKind::DoubleSlash, name("a")]);
    }

    #[test]
    fn axis_word_followed_by_colons() {
        assert_eq!(
            kinds("child::a"),
            vec![
                TokenKind::AxisWord(Axis::Child),
                TokenKind::ColonColon,
                name("a")
            ]
        );

        assert_eq!(
            kinds("descendant-or-self::node()"),
            vec![
                TokenKind::AxisWord(Axis::DescendantOrSelf),
                TokenKind::ColonColon,
                TokenKind::KindNode,
                TokenKind::LeftParen,
                TokenKind::RightParen
            ]
        );
    }

    #[test]
    fn axis_word_without_colons_is_a_name() {
        assert_eq!(kinds("child"), vec![name("child")]);
        assert_eq!(kinds("child/a"), vec![name("child"), TokenKind::Slash, name("a")]);
        // `attribute` falls back to the kind-test word, not a plain name
        assert_eq!(
            kinds("attribute(x)"),
            vec![
                TokenKind::KindAttribute,
                TokenKind::LeftParen,
                name("x"),
                TokenKind::RightParen
            ]
        );
    }

    #[test]
    fn predicates_and_abbreviations() {
        assert_eq!(
            kinds("child::a[2]"),
            vec![
                TokenKind::AxisWord(Axis::Child),
                TokenKind::ColonColon,
                name("a"),
                TokenKind::LeftBracket,
                TokenKind::Integer(2),
                TokenKind::RightBracket
            ]
        );

        assert_eq!(kinds("@a"), vec![TokenKind::At, name("a")]);
        assert_eq!(kinds(".."), vec![TokenKind::DotDot]);
        assert_eq!(kinds("."), vec![TokenKind::Dot]);
    }

    #[test]
    fn kind_test_words() {
        assert_eq!(
            kinds("text()"),
            vec![
                TokenKind::KindText,
                TokenKind::LeftParen,
                TokenKind::RightParen
            ]
        );
    }

    #[test]
    fn comparison_symbols() {
        assert_eq!(
            kinds("a==b"),
            vec![name("a"), TokenKind::GeneralEq, name("b")]
        );
        assert_eq!(
            kinds("a = b"),
            vec![name("a"), TokenKind::GeneralEq, name("b")]
        );
        assert_eq!(
            kinds("1 <= 2"),
            vec![
                TokenKind::Integer(1),
                TokenKind::GeneralLe,
                TokenKind::Integer(2)
            ]
        );
        assert_eq!(
            kinds("a eq b"),
            vec![name("a"), TokenKind::ValueEq, name("b")]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Integer(42)]);
        assert_eq!(kinds("4.25"), vec![TokenKind::Double(4.25)]);
        assert_eq!(kinds("4."), vec![TokenKind::Double(4.0)]);
        assert_eq!(
            kinds("1+2"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Plus,
                TokenKind::Integer(2)
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(kinds("'abc'"), vec![TokenKind::Str("abc".to_string())]);
        assert_eq!(kinds("\"a'b\""), vec![TokenKind::Str("a'b".to_string())]);
        assert_eq!(
            kinds(r#"'it\'s'"#),
            vec![TokenKind::Str("it's".to_string())]
        );
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".to_string())]
        );
    }

    #[test]
    fn offsets_are_byte_positions() {
        let tokens = Lexer::new("a / b").collect::<Result<Vec<_>>>().unwrap();
        let offsets = tokens.iter().map(|t| t.offset).collect::<Vec<_>>();

        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let err = Lexer::new("'abc").collect::<Result<Vec<_>>>().unwrap_err();

        assert_eq!(err.code(), ErrorCode::XPST0003);
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn unrecognised_character_is_a_lex_error() {
        let err = Lexer::new("a # b").collect::<Result<Vec<_>>>().unwrap_err();

        assert_eq!(err.code(), ErrorCode::XPST0003);
        assert_eq!(err.offset(), Some(2));
    }
}
