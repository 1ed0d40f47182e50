// Toy Scanner
// Source text to tokens with line/column spans

use crate::error::{Span, ToyError, ToyResult};
use crate::lexer::token::{Token, TokenKind, SYMBOLS};

pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_line: usize,
    start_column: usize,
    file: String,
}

impl Scanner {
    pub fn new(source: &str, file: impl Into<String>) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            file: file.into(),
        }
    }

    /// Scan all tokens from the source
    pub fn scan_tokens(&mut self) -> ToyResult<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            "",
            Span::single(self.line, self.column, self.current),
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> ToyResult<()> {
        let c = self.advance();
        match c {
            ' ' | '\r' | '\t' | '\n' => Ok(()),
            '/' if self.peek() == '/' => {
                while self.peek() != '\n' && !self.is_at_end() {
                    self.advance();
                }
                Ok(())
            }
            '/' if self.peek() == '*' => {
                self.advance();
                self.block_comment()
            }
            '"' | '\'' => self.string(c),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => {
                self.identifier();
                Ok(())
            }
            c => self.symbol(c),
        }
    }

    /// Longest operator or punctuation starting with `first`
    fn symbol(&mut self, first: char) -> ToyResult<()> {
        let next = self.peek();
        let found = SYMBOLS.iter().find(|(spelling, _)| {
            let mut chars = spelling.chars();
            chars.next() == Some(first) && chars.next().map_or(true, |second| second == next)
        });

        let Some((spelling, kind)) = found else {
            let help = match first {
                '&' => "Use '&&' for logical and",
                '|' => "Use '||' for logical or",
                _ => "Remove this character or check for typos",
            };
            return Err(self
                .error(&format!("Unexpected character '{}'", first))
                .with_help(help));
        };
        if spelling.len() == 2 {
            self.advance();
        }
        self.add_token(kind.clone());
        Ok(())
    }

    fn string(&mut self, quote_char: char) -> ToyResult<()> {
        let mut value = String::new();

        while self.peek() != quote_char && !self.is_at_end() {
            let c = self.advance();
            if c != '\\' {
                value.push(c);
                continue;
            }
            if self.is_at_end() {
                break;
            }
            let escaped = self.advance();
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                '\\' => value.push('\\'),
                '"' => value.push('"'),
                '\'' => value.push('\''),
                other => {
                    return Err(self
                        .error(&format!("Unknown escape sequence '\\{}'", other))
                        .with_help("Supported escapes: \\n \\t \\r \\0 \\\\ \\\" \\'"));
                }
            }
        }

        if self.is_at_end() {
            return Err(ToyError::syntax_error(
                "Unterminated string",
                Span::from_positions(self.start_line, self.start_column, self.line, self.column),
                &self.file,
            )
            .with_help("Add a closing quote to terminate the string"));
        }

        // Closing quote
        self.advance();
        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn number(&mut self) -> ToyResult<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // Look for decimal part
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let value: f64 = lexeme
            .parse()
            .map_err(|_| self.error(&format!("Invalid number '{}'", lexeme)))?;

        self.add_token(TokenKind::Number(value));
        Ok(())
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier(text));
        self.add_token(kind);
    }

    fn block_comment(&mut self) -> ToyResult<()> {
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(ToyError::syntax_error(
            "Unterminated block comment",
            Span::from_positions(self.start_line, self.start_column, self.line, self.column),
            &self.file,
        )
        .with_help("Add '*/' to close the block comment"))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let span = Span::from_positions(self.start_line, self.start_column, self.line, self.column);
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    fn error(&self, message: &str) -> ToyError {
        ToyError::syntax_error(
            message,
            Span::from_positions(self.start_line, self.start_column, self.line, self.column),
            &self.file,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source, "test")
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            kinds("a += b++ <= --c"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::PlusEqual,
                TokenKind::Identifier("b".into()),
                TokenKind::PlusPlus,
                TokenKind::LessEqual,
                TokenKind::MinusMinus,
                TokenKind::Identifier("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_literals() {
        assert_eq!(
            kinds("coroutine g() { yield(1.5, \"a\\tb\"); }"),
            vec![
                TokenKind::Coroutine,
                TokenKind::Identifier("g".into()),
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::Yield,
                TokenKind::LeftParen,
                TokenKind::Number(1.5),
                TokenKind::Comma,
                TokenKind::String("a\tb".into()),
                TokenKind::RightParen,
                TokenKind::Semicolon,
                TokenKind::RightBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped_and_lines_tracked() {
        let tokens = Scanner::new("// one\n/* two\n */ x", "test")
            .scan_tokens()
            .unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier("x".into()));
        assert_eq!(tokens[0].span.start.line, 3);
        assert_eq!(tokens[0].span.start.column, 5);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = Scanner::new("\"abc", "test").scan_tokens().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
        assert_eq!(err.message, "Unterminated string");
    }
}
