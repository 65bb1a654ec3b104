//! Single-pass lexer.
//!
//! One character of lookahead plus one of peek-next, byte-oriented. Tracks
//! 1-based line and column; the column resets on every newline. Whitespace,
//! `//` line comments, and a leading shebang line are skipped. The stream
//! ends with exactly one EOF token; callers must not ask for more after it.

use crate::token::{Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer {
            source,
            start: 0,
            current: 0,
            line: 1,
            column: 1,
        };

        // A shebang line (#!/usr/bin/env riau) is skipped like a comment.
        if source.as_bytes().starts_with(b"#!") {
            while !lexer.is_at_end() && lexer.peek() != b'\n' {
                lexer.current += 1;
            }
            if lexer.peek() == b'\n' {
                lexer.current += 1;
                lexer.line += 1;
                lexer.column = 1;
            }
            lexer.start = lexer.current;
        }

        lexer
    }

    pub fn next_token(&mut self) -> Token<'src> {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();

        if c.is_ascii_alphabetic() || c == b'_' {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            b'(' => self.make_token(TokenKind::LParen),
            b')' => self.make_token(TokenKind::RParen),
            b'{' => self.make_token(TokenKind::LBrace),
            b'}' => self.make_token(TokenKind::RBrace),
            b'[' => self.make_token(TokenKind::LBracket),
            b']' => self.make_token(TokenKind::RBracket),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b':' => self.make_token(TokenKind::Colon),
            b';' => self.make_token(TokenKind::Semicolon),
            b'?' => self.make_token(TokenKind::Question),
            b'+' => self.make_token(TokenKind::Plus),
            b'-' => self.make_token(TokenKind::Minus),
            b'*' => self.make_token(TokenKind::Star),
            b'/' => self.make_token(TokenKind::Slash),
            b'%' => self.make_token(TokenKind::Percent),
            b'!' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::NotEqual)
                } else {
                    self.make_token(TokenKind::Not)
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::Equal)
                } else if self.matches(b'>') {
                    self.make_token(TokenKind::Arrow)
                } else {
                    self.make_token(TokenKind::Assign)
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            // Bare '&' and '|' are not operators.
            b'&' if self.matches(b'&') => self.make_token(TokenKind::And),
            b'|' if self.matches(b'|') => self.make_token(TokenKind::Or),
            b'"' => self.string(),
            _ => self.error_token("Unexpected character"),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> u8 {
        self.source.as_bytes().get(self.current).copied().unwrap_or(0)
    }

    fn peek_next(&self) -> u8 {
        self.source
            .as_bytes()
            .get(self.current + 1)
            .copied()
            .unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.peek();
        self.current += 1;
        self.column += 1;
        c
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }
        self.current += 1;
        self.column += 1;
        true
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.column = 0;
                    self.advance();
                }
                b'/' if self.peek_next() == b'/' => {
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        let length = self.current - self.start;
        Token {
            kind,
            lexeme: &self.source[self.start..self.current],
            start: self.start,
            line: self.line,
            // Saturates for tokens that span a newline (multi-line strings).
            column: self.column.saturating_sub(length as u32),
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token {
            kind: TokenKind::Error,
            lexeme: message,
            start: self.start,
            line: self.line,
            column: self.column,
        }
    }

    fn string(&mut self) -> Token<'src> {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
                self.column = 0;
            }
            self.advance();
        }

        if self.is_at_end() {
            return self.error_token("Unterminated string");
        }

        self.advance(); // closing quote
        self.make_token(TokenKind::String)
    }

    fn number(&mut self) -> Token<'src> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance(); // consume '.'
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'src> {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
        let lexeme = &self.source[self.start..self.current];
        self.make_token(keyword_kind(lexeme))
    }
}

fn keyword_kind(lexeme: &str) -> TokenKind {
    match lexeme {
        "let" => TokenKind::Let,
        "fn" => TokenKind::Fn,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "as" => TokenKind::As,
        "entity" => TokenKind::Entity,
        "use" => TokenKind::Use,
        "spawn" => TokenKind::Spawn,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let kind = token.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_keywords() {
        use TokenKind::*;
        assert_eq!(
            kinds("let fn if else for in return try catch as entity use spawn true false"),
            vec![
                Let, Fn, If, Else, For, In, Return, Try, Catch, As, Entity, Use, Spawn, True,
                False, Eof
            ]
        );
    }

    #[test]
    fn test_literals() {
        use TokenKind::*;
        assert_eq!(
            kinds("123 45.67 \"hello\" true false"),
            vec![Number, Number, String, True, False, Eof]
        );
    }

    #[test]
    fn test_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("+ - * / % ! = == != < > <= >= && || => ?"),
            vec![
                Plus, Minus, Star, Slash, Percent, Not, Assign, Equal, NotEqual, Less, Greater,
                LessEqual, GreaterEqual, And, Or, Arrow, Question, Eof
            ]
        );
    }

    #[test]
    fn test_punctuation() {
        use TokenKind::*;
        assert_eq!(
            kinds("( ) { } [ ] , . : ;"),
            vec![
                LParen, RParen, LBrace, RBrace, LBracket, RBracket, Comma, Dot, Colon, Semicolon,
                Eof
            ]
        );
    }

    #[test]
    fn test_lexemes_borrow_source() {
        let source = "let count = 42";
        let mut lexer = Lexer::new(source);
        let let_tok = lexer.next_token();
        let name = lexer.next_token();
        assert_eq!(let_tok.lexeme, "let");
        assert_eq!(name.lexeme, "count");
        assert_eq!(name.start, 4);
        assert_eq!(&source[name.start..name.start + name.lexeme.len()], "count");
    }

    #[test]
    fn test_number_without_trailing_fraction() {
        // "1." lexes as the number 1 followed by a dot.
        use TokenKind::*;
        assert_eq!(kinds("1."), vec![Number, Dot, Eof]);
        assert_eq!(kinds("1.5"), vec![Number, Eof]);
    }

    #[test]
    fn test_string_lexeme_includes_quotes() {
        let mut lexer = Lexer::new("\"hi\"");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.lexeme, "\"hi\"");
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let mut lexer = Lexer::new("\"oops");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated string");
    }

    #[test]
    fn test_bare_ampersand_and_pipe_are_errors() {
        let mut lexer = Lexer::new("&");
        assert_eq!(lexer.next_token().kind, TokenKind::Error);
        let mut lexer = Lexer::new("|");
        assert_eq!(lexer.next_token().kind, TokenKind::Error);
    }

    #[test]
    fn test_line_comments_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("let x // trailing\nlet y"), vec![Let, Identifier, Let, Identifier, Eof]);
    }

    #[test]
    fn test_shebang_is_skipped() {
        let mut lexer = Lexer::new("#!/usr/bin/env riau\nlet x");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Let);
        assert_eq!(token.line, 2);
    }

    #[test]
    fn test_line_and_column_tracking() {
        let mut lexer = Lexer::new("let x\n  foo");
        let let_tok = lexer.next_token();
        assert_eq!((let_tok.line, let_tok.column), (1, 1));
        let x = lexer.next_token();
        assert_eq!((x.line, x.column), (1, 5));
        let foo = lexer.next_token();
        assert_eq!((foo.line, foo.column), (2, 3));
    }

    #[test]
    fn test_newline_inside_string_advances_line() {
        let mut lexer = Lexer::new("\"a\nb\" x");
        let string = lexer.next_token();
        assert_eq!(string.kind, TokenKind::String);
        let x = lexer.next_token();
        assert_eq!(x.line, 2);
    }

    #[test]
    fn test_single_eof_for_empty_input() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n\t "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_tokens_tile_the_source() {
        // Token offsets plus skipped gaps reconstruct the buffer.
        let source = "let x = 1 + 2 // done\nprint(x)";
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push(token);
        }
        let mut rebuilt = String::new();
        let mut cursor = 0;
        for token in &tokens {
            rebuilt.push_str(&source[cursor..token.start]);
            rebuilt.push_str(token.lexeme);
            cursor = token.start + token.lexeme.len();
        }
        rebuilt.push_str(&source[cursor..]);
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_kind_names_are_deterministic() {
        let first: Vec<&str> = kinds("let x = 1").iter().map(|k| k.name()).collect();
        let second: Vec<&str> = kinds("let x = 1").iter().map(|k| k.name()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["LET", "IDENTIFIER", "ASSIGN", "NUMBER", "EOF"]);
    }
}
