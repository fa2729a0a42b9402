pub mod token;

use std::rc::Rc;
use token::{Token, TokenType};

/// Hand-written scanner over the source text. Produces a flat token stream
/// ending in `EOF`; malformed input (unterminated strings, stray
/// characters) surfaces as `Unknown` tokens rather than aborting, leaving
/// error reporting to the parser.
pub struct Lexer {
    source: Vec<char>,
    start: usize,
    current: usize,
    line: u32,
    token_line: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            token_line: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.current + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn slice(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn make(&self, typ: TokenType) -> Rc<Token> {
        Rc::new(Token::new(typ, self.slice(), self.token_line))
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.current += 1;
                }
                Some('\n') => {
                    self.current += 1;
                    self.line += 1;
                }
                Some('-') if self.peek_next() == Some('-') => {
                    self.current += 2;
                    if self.peek() == Some('[') && self.source.get(self.current + 1) == Some(&'[')
                    {
                        self.current += 2;
                        loop {
                            match self.peek() {
                                None => break,
                                Some(']') if self.source.get(self.current + 1) == Some(&']') => {
                                    self.current += 2;
                                    break;
                                }
                                Some('\n') => {
                                    self.line += 1;
                                    self.current += 1;
                                }
                                Some(_) => {
                                    self.current += 1;
                                }
                            }
                        }
                    } else {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.current += 1;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Strings have no escapes; an embedded `"` always closes the literal.
    /// An unterminated string runs to EOF and comes back as `Unknown`.
    fn string(&mut self) -> Rc<Token> {
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.current += 1;
        }
        if self.at_end() {
            return self.make(TokenType::Unknown);
        }
        self.current += 1;
        let value: String = self.source[self.start + 1..self.current - 1]
            .iter()
            .collect();
        Rc::new(Token::new(TokenType::String, value, self.token_line))
    }

    fn number(&mut self) -> Rc<Token> {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.current += 1;
        }
        if self.peek() == Some('.') && matches!(self.peek_next(), Some(c) if c.is_ascii_digit()) {
            self.current += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.current += 1;
            }
        }
        self.make(TokenType::Number)
    }

    fn identifier(&mut self) -> Rc<Token> {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.current += 1;
        }
        let word = self.slice();
        match TokenType::keyword(&word) {
            Some(typ) => self.make(typ),
            None => self.make(TokenType::Identifier),
        }
    }

    fn next_token(&mut self) -> Rc<Token> {
        self.skip_whitespace_and_comments();
        self.start = self.current;
        self.token_line = self.line;

        if self.at_end() {
            return self.make(TokenType::EOF);
        }

        match self.advance() {
            '(' => self.make(TokenType::OParen),
            ')' => self.make(TokenType::CParen),
            ',' => self.make(TokenType::Comma),
            '+' => self.make(TokenType::Plus),
            '-' => self.make(TokenType::Minus),
            '*' => self.make(TokenType::Star),
            '/' => self.make(TokenType::Slash),
            '=' => {
                if self.matches('=') {
                    self.make(TokenType::DEqual)
                } else {
                    self.make(TokenType::Equal)
                }
            }
            '~' => {
                if self.matches('=') {
                    self.make(TokenType::NotEqual)
                } else {
                    self.make(TokenType::Unknown)
                }
            }
            '>' => {
                if self.matches('=') {
                    self.make(TokenType::GreaterEqual)
                } else {
                    self.make(TokenType::Greater)
                }
            }
            '<' => {
                if self.matches('=') {
                    self.make(TokenType::LessEqual)
                } else {
                    self.make(TokenType::Less)
                }
            }
            '.' => {
                if self.matches('.') {
                    self.make(TokenType::Concat)
                } else {
                    self.make(TokenType::Unknown)
                }
            }
            '"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            _ => self.make(TokenType::Unknown),
        }
    }

    /// Consumes the lexer, producing the full token stream. Always ends
    /// with exactly one `EOF` token.
    pub fn lex(mut self) -> Vec<Rc<Token>> {
        let mut tokens = vec![];
        loop {
            let token = self.next_token();
            let is_eof = token.typ() == TokenType::EOF;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenType> {
        Lexer::new(src).lex().iter().map(|t| t.typ()).collect()
    }

    #[test]
    fn punctuation_and_multichar_operators() {
        assert_eq!(
            lex("( ) , + - * / = == ~= > >= < <= .."),
            vec![
                TokenType::OParen,
                TokenType::CParen,
                TokenType::Comma,
                TokenType::Plus,
                TokenType::Minus,
                TokenType::Star,
                TokenType::Slash,
                TokenType::Equal,
                TokenType::DEqual,
                TokenType::NotEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Concat,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn keywords_vs_identifiers() {
        assert_eq!(
            lex("if end whileness"),
            vec![TokenType::If, TokenType::End, TokenType::Identifier, TokenType::EOF]
        );
    }

    #[test]
    fn number_literals() {
        let tokens = Lexer::new("10 3.14").lex();
        assert_eq!(tokens[0].typ(), TokenType::Number);
        assert_eq!(tokens[0].lexeme(), "10");
        assert_eq!(tokens[1].typ(), TokenType::Number);
        assert_eq!(tokens[1].lexeme(), "3.14");
    }

    #[test]
    fn string_literal_lexeme_has_no_quotes() {
        let tokens = Lexer::new("\"hi\"").lex();
        assert_eq!(tokens[0].typ(), TokenType::String);
        assert_eq!(tokens[0].lexeme(), "hi");
    }

    #[test]
    fn unterminated_string_is_unknown() {
        let tokens = Lexer::new("\"hi").lex();
        assert_eq!(tokens[0].typ(), TokenType::Unknown);
    }

    #[test]
    fn line_comment_is_discarded() {
        assert_eq!(lex("-- comment\nprint"), vec![TokenType::Print, TokenType::EOF]);
    }

    #[test]
    fn block_comment_counts_lines() {
        let tokens = Lexer::new("--[[\nfoo\n]]\nprint").lex();
        assert_eq!(tokens[0].typ(), TokenType::Print);
        assert_eq!(tokens[0].line(), 4);
    }

    #[test]
    fn line_tracking_across_newlines() {
        let tokens = Lexer::new("print\n\nprint").lex();
        assert_eq!(tokens[0].line(), 1);
        assert_eq!(tokens[1].line(), 3);
    }
}
