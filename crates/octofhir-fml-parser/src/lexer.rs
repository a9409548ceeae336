//! Lexer for FML documents
//!
//! Produces the token vector consumed by the parser. Whitespace and comments are
//! not tokens: the syntax tree keeps them as trivia between tokens, and comments
//! are also collected in a [`CommentTable`] keyed by the byte offsets of the tokens
//! they attach to.

use octofhir_fml_diagnostics::{
    FML0005, FML0006, FML0008, FML0009, FmlError, Result, SourceLocation, TokenSpan,
};
use std::collections::HashMap;
use std::fmt;

/// Token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKind {
    /// Identifier or keyword, including `$this`, `$index`, `$total`
    Identifier,
    /// `` `delimited identifier` ``
    DelimitedIdentifier,
    /// `'single quoted'`
    String,
    /// `"double quoted"`
    DoubleQuotedString,
    /// `"""triple quoted"""`
    TripleQuotedString,
    Integer,
    Decimal,
    /// `@2020-01-01`
    Date,
    /// `@2020-01-01T10:00:00Z`
    DateTime,
    /// `@T10:00`
    Time,
    /// `/// ` at the start of a metadata declaration
    MetadataPrefix,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    DotDot,
    Arrow,
    Equal,
    DoubleEqual,
    NotEqual,
    Tilde,
    NotTilde,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    DoubleLess,
    DoubleGreater,
    Plus,
    Minus,
    Star,
    Slash,
    Ampersand,
    Pipe,
    Percent,
    Eof,
}

impl TokenKind {
    /// Every token kind, indexed by discriminant
    pub const ALL: &'static [TokenKind] = &[
        Self::Identifier,
        Self::DelimitedIdentifier,
        Self::String,
        Self::DoubleQuotedString,
        Self::TripleQuotedString,
        Self::Integer,
        Self::Decimal,
        Self::Date,
        Self::DateTime,
        Self::Time,
        Self::MetadataPrefix,
        Self::LParen,
        Self::RParen,
        Self::LBrace,
        Self::RBrace,
        Self::LBracket,
        Self::RBracket,
        Self::Comma,
        Self::Semicolon,
        Self::Colon,
        Self::Dot,
        Self::DotDot,
        Self::Arrow,
        Self::Equal,
        Self::DoubleEqual,
        Self::NotEqual,
        Self::Tilde,
        Self::NotTilde,
        Self::Less,
        Self::LessEqual,
        Self::Greater,
        Self::GreaterEqual,
        Self::DoubleLess,
        Self::DoubleGreater,
        Self::Plus,
        Self::Minus,
        Self::Star,
        Self::Slash,
        Self::Ampersand,
        Self::Pipe,
        Self::Percent,
        Self::Eof,
    ];

    /// Human-readable description used in syntax errors
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::DelimitedIdentifier => "delimited identifier",
            Self::String => "string",
            Self::DoubleQuotedString => "double-quoted string",
            Self::TripleQuotedString => "markdown string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::Time => "time",
            Self::MetadataPrefix => "`/// `",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::Comma => "`,`",
            Self::Semicolon => "`;`",
            Self::Colon => "`:`",
            Self::Dot => "`.`",
            Self::DotDot => "`..`",
            Self::Arrow => "`->`",
            Self::Equal => "`=`",
            Self::DoubleEqual => "`==`",
            Self::NotEqual => "`!=`",
            Self::Tilde => "`~`",
            Self::NotTilde => "`!~`",
            Self::Less => "`<`",
            Self::LessEqual => "`<=`",
            Self::Greater => "`>`",
            Self::GreaterEqual => "`>=`",
            Self::DoubleLess => "`<<`",
            Self::DoubleGreater => "`>>`",
            Self::Plus => "`+`",
            Self::Minus => "`-`",
            Self::Star => "`*`",
            Self::Slash => "`/`",
            Self::Ampersand => "`&`",
            Self::Pipe => "`|`",
            Self::Percent => "`%`",
            Self::Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A significant token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Exact source text
    pub text: String,
    /// Source position
    pub span: TokenSpan,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, text: impl Into<String>, span: TokenSpan) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Whether this is an identifier with the given text
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == keyword
    }
}

/// A `//` or `/* */` comment, text including delimiters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Comment text
    pub text: String,
    /// Source position
    pub span: TokenSpan,
}

/// Comments keyed by the offsets of the tokens they attach to
///
/// Comments starting on the line where the previous token ends are trailing
/// comments of that token, as long as no blank line separates them from the next
/// token. Every other comment leads the next token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentTable {
    /// Comments preceding the token that starts at the key offset
    pub leading: HashMap<usize, Vec<Comment>>,
    /// Comments following the token that stops at the key offset
    pub trailing: HashMap<usize, Vec<Comment>>,
}

impl CommentTable {
    /// Comments leading the token starting at `start_index`
    pub fn leading_at(&self, start_index: usize) -> &[Comment] {
        self.leading.get(&start_index).map(Vec::as_slice).unwrap_or_default()
    }

    /// Comments trailing the token stopping at `stop_index`
    pub fn trailing_at(&self, stop_index: usize) -> &[Comment] {
        self.trailing.get(&stop_index).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of comments in the table
    pub fn len(&self) -> usize {
        self.leading.values().chain(self.trailing.values()).map(Vec::len).sum()
    }

    /// Whether the table holds no comments
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of the lexer
#[derive(Debug, Clone, Default)]
pub struct Lexed {
    /// Significant tokens, terminated by [`TokenKind::Eof`]
    pub tokens: Vec<Token>,
    /// Comment side table
    pub comments: CommentTable,
}

/// Lex an FML document
pub fn lex(source: &str) -> Result<Lexed> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    comments: CommentTable,
    /// Comments seen since the last token, with the newline count before each
    pending: Vec<(Comment, usize)>,
    newlines_since_last: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            comments: CommentTable::default(),
            pending: Vec::new(),
            newlines_since_last: 0,
        }
    }

    fn run(mut self) -> Result<Lexed> {
        while let Some(ch) = self.peek() {
            match ch {
                '\n' => {
                    self.newlines_since_last += 1;
                    self.bump();
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.rest().starts_with("/// ") => {
                    self.single(TokenKind::MetadataPrefix, 4);
                }
                '/' if self.rest().starts_with("//") => self.line_comment(),
                '/' if self.rest().starts_with("/*") => self.block_comment()?,
                '\'' => self.quoted('\'', TokenKind::String)?,
                '`' => self.quoted('`', TokenKind::DelimitedIdentifier)?,
                '"' if self.rest().starts_with("\"\"\"") => self.triple_quoted()?,
                '"' => self.quoted('"', TokenKind::DoubleQuotedString)?,
                '@' => self.date_time()?,
                c if c.is_ascii_digit() => self.number(),
                c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.identifier(),
                _ => self.punctuation()?,
            }
        }

        let eof = TokenSpan::new(
            self.line,
            self.column,
            self.source.len(),
            self.source.len().saturating_sub(1),
        );
        self.push(Token::new(TokenKind::Eof, "", eof));
        Ok(Lexed {
            tokens: self.tokens,
            comments: self.comments,
        })
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.pos, 1)
    }

    fn start(&self) -> (usize, usize, usize) {
        (self.line, self.column, self.pos)
    }

    fn span_from(&self, start: (usize, usize, usize)) -> TokenSpan {
        TokenSpan::new(start.0, start.1, start.2, self.pos.saturating_sub(1).max(start.2))
    }

    /// Consume `len` ASCII bytes as one token
    fn single(&mut self, kind: TokenKind, len: usize) {
        let start = self.start();
        for _ in 0..len {
            self.bump();
        }
        let span = self.span_from(start);
        let text = &self.source[start.2..self.pos];
        self.push(Token::new(kind, text, span));
    }

    fn push(&mut self, token: Token) {
        let pending = std::mem::take(&mut self.pending);
        let blank_before_next = self.newlines_since_last >= 2;
        self.newlines_since_last = 0;

        let previous = self.tokens.last().map(|t| t.span);
        let mut trailing = Vec::new();
        let mut leading = Vec::new();
        for (index, (comment, newlines_before)) in pending.into_iter().enumerate() {
            let same_line = index == 0 && newlines_before == 0 && previous.is_some();
            if same_line && !blank_before_next {
                trailing.push(comment);
            } else {
                leading.push(comment);
            }
        }

        if let (Some(prev), false) = (previous, trailing.is_empty()) {
            self.comments.trailing.insert(prev.stop_index, trailing);
        }
        if !leading.is_empty() {
            self.comments.leading.insert(token.span.start_index, leading);
        }
        self.tokens.push(token);
    }

    fn push_comment(&mut self, comment: Comment) {
        self.pending.push((comment, self.newlines_since_last));
        self.newlines_since_last = 0;
    }

    fn line_comment(&mut self) {
        let start = self.start();
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
        let text = self.source[start.2..self.pos].trim_end_matches('\r').to_string();
        let span = self.span_from(start);
        self.push_comment(Comment { text, span });
    }

    fn block_comment(&mut self) -> Result<()> {
        let start = self.start();
        let location = self.location();
        self.bump();
        self.bump();
        loop {
            if self.rest().starts_with("*/") {
                self.bump();
                self.bump();
                break;
            }
            if self.bump().is_none() {
                return Err(FmlError::parse_at(FML0006, "Unterminated block comment", location));
            }
        }
        let text = self.source[start.2..self.pos].to_string();
        let span = self.span_from(start);
        self.push_comment(Comment { text, span });
        Ok(())
    }

    fn quoted(&mut self, quote: char, kind: TokenKind) -> Result<()> {
        let start = self.start();
        let location = self.location();
        self.bump();
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => break,
                Some(_) => {}
                None => {
                    return Err(FmlError::parse_at(
                        FML0005,
                        format!("Unterminated {}", kind.describe()),
                        location,
                    ));
                }
            }
        }
        let span = self.span_from(start);
        let text = &self.source[start.2..self.pos];
        self.push(Token::new(kind, text, span));
        Ok(())
    }

    fn triple_quoted(&mut self) -> Result<()> {
        let start = self.start();
        let location = self.location();
        for _ in 0..3 {
            self.bump();
        }
        loop {
            if self.rest().starts_with("\"\"\"") {
                for _ in 0..3 {
                    self.bump();
                }
                break;
            }
            if self.bump().is_none() {
                return Err(FmlError::parse_at(FML0005, "Unterminated markdown string", location));
            }
        }
        let span = self.span_from(start);
        let text = &self.source[start.2..self.pos];
        self.push(Token::new(TokenKind::TripleQuotedString, text, span));
        Ok(())
    }

    fn number(&mut self) {
        let start = self.start();
        self.eat_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::Integer;
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
            kind = TokenKind::Decimal;
        }
        let span = self.span_from(start);
        let text = &self.source[start.2..self.pos];
        self.push(Token::new(kind, text, span));
    }

    fn identifier(&mut self) {
        let start = self.start();
        self.bump();
        self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let span = self.span_from(start);
        let text = &self.source[start.2..self.pos];
        self.push(Token::new(TokenKind::Identifier, text, span));
    }

    fn date_time(&mut self) -> Result<()> {
        let start = self.start();
        let location = self.location();
        self.bump();

        let kind = if self.peek() == Some('T') {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit() || c == ':' || c == '.');
            TokenKind::Time
        } else {
            self.eat_while(|c| c.is_ascii_digit() || c == '-');
            if self.peek() == Some('T') {
                self.bump();
                self.eat_while(|c| c.is_ascii_digit() || c == ':' || c == '.');
                self.time_zone();
                TokenKind::DateTime
            } else {
                TokenKind::Date
            }
        };

        let text = &self.source[start.2..self.pos];
        let body = text.trim_start_matches('@').trim_start_matches('T');
        if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(FmlError::parse_at(
                FML0008,
                format!("Invalid date/time literal `{text}`"),
                location,
            ));
        }
        let span = self.span_from(start);
        self.push(Token::new(kind, text, span));
        Ok(())
    }

    fn time_zone(&mut self) {
        match self.peek() {
            Some('Z') => {
                self.bump();
            }
            Some('+' | '-')
                if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit())
                    && self.peek_nth(3) == Some(':') =>
            {
                self.bump();
                self.eat_while(|c| c.is_ascii_digit() || c == ':');
            }
            _ => {}
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.bump();
        }
    }

    fn punctuation(&mut self) -> Result<()> {
        let two = self.rest().get(..2).unwrap_or_default();
        let double = match two {
            "->" => Some(TokenKind::Arrow),
            ".." => Some(TokenKind::DotDot),
            "==" => Some(TokenKind::DoubleEqual),
            "!=" => Some(TokenKind::NotEqual),
            "!~" => Some(TokenKind::NotTilde),
            "<=" => Some(TokenKind::LessEqual),
            ">=" => Some(TokenKind::GreaterEqual),
            "<<" => Some(TokenKind::DoubleLess),
            ">>" => Some(TokenKind::DoubleGreater),
            _ => None,
        };
        if let Some(kind) = double {
            self.single(kind, 2);
            return Ok(());
        }

        let Some(ch) = self.peek() else {
            return Ok(());
        };
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '=' => TokenKind::Equal,
            '~' => TokenKind::Tilde,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '&' => TokenKind::Ampersand,
            '|' => TokenKind::Pipe,
            '%' => TokenKind::Percent,
            other => {
                return Err(FmlError::parse_at(
                    FML0009,
                    format!("Unexpected character `{other}`"),
                    self.location(),
                ));
            }
        };
        self.single(kind, 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .map(|l| l.tokens.into_iter().map(|t| t.kind).collect())
            .unwrap_or_default()
    }

    #[rstest]
    #[case("src.a -> tgt.a;", vec![
        TokenKind::Identifier, TokenKind::Dot, TokenKind::Identifier, TokenKind::Arrow,
        TokenKind::Identifier, TokenKind::Dot, TokenKind::Identifier, TokenKind::Semicolon,
        TokenKind::Eof,
    ])]
    #[case("0..*", vec![TokenKind::Integer, TokenKind::DotDot, TokenKind::Star, TokenKind::Eof])]
    #[case("1.5", vec![TokenKind::Decimal, TokenKind::Eof])]
    #[case("<<type+>>", vec![
        TokenKind::DoubleLess, TokenKind::Identifier, TokenKind::Plus, TokenKind::DoubleGreater,
        TokenKind::Eof,
    ])]
    #[case("@2020-01-01T10:00:00+01:00 @2020 @T10:30", vec![
        TokenKind::DateTime, TokenKind::Date, TokenKind::Time, TokenKind::Eof,
    ])]
    #[case("/// url = 'x'", vec![
        TokenKind::MetadataPrefix, TokenKind::Identifier, TokenKind::Equal, TokenKind::String,
        TokenKind::Eof,
    ])]
    #[case("$this != %var", vec![
        TokenKind::Identifier, TokenKind::NotEqual, TokenKind::Percent, TokenKind::Identifier,
        TokenKind::Eof,
    ])]
    fn test_token_kinds(#[case] source: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(source), expected);
    }

    #[test]
    fn test_token_spans() -> Result<()> {
        let source = "group  x\n  ( source";
        let lexed = lex(source)?;
        let spans: Vec<_> = lexed.tokens.iter().map(|t| t.span).collect();
        assert_eq!(spans[0], TokenSpan::new(1, 1, 0, 4));
        assert_eq!(spans[1], TokenSpan::new(1, 8, 7, 7));
        assert_eq!(spans[2], TokenSpan::new(2, 3, 11, 11));
        assert_eq!(spans[3], TokenSpan::new(2, 5, 13, 18));
        for token in &lexed.tokens[..4] {
            assert_eq!(token.span.text(source), Some(token.text.as_str()));
        }
        Ok(())
    }

    #[test]
    fn test_strings_keep_quotes() -> Result<()> {
        let lexed = lex(r#"'it\'s' "url" """md""""#)?;
        let texts: Vec<_> = lexed.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec![r"'it\'s'", "\"url\"", "\"\"\"md\"\"\"", ""]);
        Ok(())
    }

    #[test]
    fn test_comment_side_table() -> Result<()> {
        let source = "a; // trailing\n// leading\nb;";
        let lexed = lex(source)?;
        assert_eq!(lexed.comments.len(), 2);

        let semicolon = &lexed.tokens[1];
        let trailing = lexed.comments.trailing_at(semicolon.span.stop_index);
        assert_eq!(trailing.len(), 1);
        assert_eq!(trailing[0].text, "// trailing");

        let b = &lexed.tokens[2];
        let leading = lexed.comments.leading_at(b.span.start_index);
        assert_eq!(leading.len(), 1);
        assert_eq!(leading[0].text, "// leading");
        Ok(())
    }

    #[test]
    fn test_blank_line_moves_comment_to_next_token() -> Result<()> {
        let source = "a; /* note */\n\nb;";
        let lexed = lex(source)?;
        let semicolon = &lexed.tokens[1];
        assert!(lexed.comments.trailing_at(semicolon.span.stop_index).is_empty());
        let b = &lexed.tokens[2];
        assert_eq!(lexed.comments.leading_at(b.span.start_index)[0].text, "/* note */");
        Ok(())
    }

    #[test]
    fn test_lex_errors() {
        let err = lex("'open").err().map(|e| e.code());
        assert_eq!(err, Some(FML0005));
        let err = lex("/* open").err().map(|e| e.code());
        assert_eq!(err, Some(FML0006));
        let err = lex("a # b").err().map(|e| e.code());
        assert_eq!(err, Some(FML0009));
    }
}
