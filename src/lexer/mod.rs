//! Tokenizer for the dialogue DSL.
//!
//! Reads UTF-8 source text and emits a token stream terminated by `Eof`, tracking
//! 1-based line/column positions. See [`crate::errors::DslError`] for the lexical
//! error variants this module can raise.

mod token;

pub use token::{NumberLiteral, Token, TokenKind, keyword};

use crate::errors::DslError;

const CJK_PUNCTUATION: &str = "，。！？、；：“”‘’（）【】《》—…·～";
const ASCII_PUNCTUATION: &str = ",.!?;:\"'()[]<>-";

/// Punctuation stripped during recognizer preprocessing (§4.3.a). Exposed here
/// because the lexer and the recognizer's preprocessor both need a definition of
/// "punctuation", and the lexer is where source-level character classification
/// already lives.
pub fn is_stripped_punctuation(c: char) -> bool {
    CJK_PUNCTUATION.contains(c) || ASCII_PUNCTUATION.contains(c)
}

/// Converts DSL source into a flat token stream.
pub struct Lexer<'src> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    _source: &'src str,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            _source: source,
        }
    }

    /// Tokenizes the whole input, returning on the first lexical error.
    pub fn tokenize(mut self) -> Result<Vec<Token>, DslError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn next_token(&mut self) -> Result<Token, DslError> {
        loop {
            match self.peek() {
                None => return Ok(Token::new(TokenKind::Eof, self.line, self.column)),
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('\n') => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    return Ok(Token::new(TokenKind::Newline, line, column));
                }
                _ => break,
            }
        }

        let (line, column) = (self.line, self.column);
        let c = self.peek().expect("checked by loop above");

        if c == '"' || c == '\'' {
            return self.lex_string(line, column);
        }
        if c.is_ascii_digit() {
            return Ok(self.lex_number(line, column));
        }
        if c == '$' {
            return self.lex_variable(line, column);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.lex_identifier(line, column));
        }

        let kind = match c {
            '+' => {
                self.advance();
                TokenKind::Plus
            }
            '-' => {
                self.advance();
                TokenKind::Minus
            }
            '*' => {
                self.advance();
                TokenKind::Star
            }
            '/' => {
                self.advance();
                TokenKind::Slash
            }
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' if self.peek_at(1) == Some('=') => {
                self.advance();
                self.advance();
                TokenKind::Neq
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            ':' => {
                self.advance();
                TokenKind::Colon
            }
            '(' => {
                self.advance();
                TokenKind::LParen
            }
            ')' => {
                self.advance();
                TokenKind::RParen
            }
            '[' => {
                self.advance();
                TokenKind::LBracket
            }
            ']' => {
                self.advance();
                TokenKind::RBracket
            }
            '{' => {
                self.advance();
                TokenKind::LBrace
            }
            '}' => {
                self.advance();
                TokenKind::RBrace
            }
            other => return Err(DslError::UnexpectedChar(other, line, column)),
        };
        Ok(Token::new(kind, line, column))
    }

    fn lex_string(&mut self, line: usize, column: usize) -> Result<Token, DslError> {
        let quote = self.advance().expect("caller verified quote present");
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(DslError::UnterminatedString(line, column)),
                Some('\n') => return Err(DslError::UnterminatedString(line, column)),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some(c) if c == quote => value.push(quote),
                        Some(other) => value.push(other),
                        None => return Err(DslError::UnterminatedString(line, column)),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::String(value), line, column))
    }

    fn lex_number(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' {
                if is_float {
                    // A second '.' terminates the number without being consumed;
                    // it is re-lexed (and rejected) as its own token.
                    break;
                }
                is_float = true;
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let literal = if is_float {
            NumberLiteral::Float(text.parse().unwrap_or(0.0))
        } else {
            NumberLiteral::Int(text.parse().unwrap_or(0))
        };
        Token::new(TokenKind::Number(literal), line, column)
    }

    fn lex_identifier(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = keyword(&text).unwrap_or(TokenKind::Identifier(text));
        Token::new(kind, line, column)
    }

    fn lex_variable(&mut self, line: usize, column: usize) -> Result<Token, DslError> {
        self.advance(); // consume '$'
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if text.is_empty() {
            return Err(DslError::UnexpectedChar('$', line, column));
        }
        Ok(Token::new(TokenKind::Variable(text), line, column))
    }
}
