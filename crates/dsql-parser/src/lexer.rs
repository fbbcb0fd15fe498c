use dsql_core::{QueryError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    Join,
    Inner,
    On,
    And,
    Or,
    Like,
    In,
    Count,
    True,
    False,

    // Operators
    Star,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Delimiters
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Semicolon,

    // Literals
    Number(String),
    String(String),
    Identifier(String),

    // Special
    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while self.position < self.input.len() {
            self.skip_whitespace();

            if self.position >= self.input.len() {
                break;
            }

            tokens.push(self.next_token()?);
        }

        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        let ch = self.current_char();

        let token = match ch {
            '*' => {
                self.advance();
                Token::Star
            }
            '=' => {
                self.advance();
                Token::Equal
            }
            '<' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Token::LessEqual
                } else if self.current_char() == '>' {
                    self.advance();
                    Token::NotEqual
                } else {
                    Token::Less
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Token::NotEqual
                } else {
                    return Err(QueryError::ParseError(
                        "Unexpected character '!'".to_string(),
                    ));
                }
            }
            '(' => {
                self.advance();
                Token::LeftParen
            }
            ')' => {
                self.advance();
                Token::RightParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '.' => {
                self.advance();
                Token::Dot
            }
            ';' => {
                self.advance();
                Token::Semicolon
            }
            '\'' | '"' => self.read_string()?,
            '-' if self.peek_char().is_ascii_digit() => self.read_number()?,
            _ if ch.is_ascii_digit() => self.read_number()?,
            _ if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
            _ => {
                return Err(QueryError::ParseError(format!(
                    "Unexpected character: '{}'",
                    ch
                )));
            }
        };

        Ok(token)
    }

    fn read_string(&mut self) -> Result<Token> {
        let quote = self.current_char();
        self.advance();

        let mut value = String::new();
        while self.position < self.input.len() && self.current_char() != quote {
            value.push(self.current_char());
            self.advance();
        }

        if self.position >= self.input.len() {
            return Err(QueryError::ParseError("Unterminated string".to_string()));
        }

        self.advance(); // Skip closing quote
        Ok(Token::String(value))
    }

    fn read_number(&mut self) -> Result<Token> {
        let mut number = String::new();
        if self.current_char() == '-' {
            number.push('-');
            self.advance();
        }

        while self.position < self.input.len()
            && (self.current_char().is_ascii_digit() || self.current_char() == '.')
        {
            number.push(self.current_char());
            self.advance();
        }

        if number.matches('.').count() > 1 {
            return Err(QueryError::ParseError(format!(
                "Invalid number literal: {}",
                number
            )));
        }

        Ok(Token::Number(number))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while self.position < self.input.len()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.current_char());
            self.advance();
        }

        match ident.to_uppercase().as_str() {
            "SELECT" => Token::Select,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "JOIN" => Token::Join,
            "INNER" => Token::Inner,
            "ON" => Token::On,
            "AND" => Token::And,
            "OR" => Token::Or,
            "LIKE" => Token::Like,
            "IN" => Token::In,
            "COUNT" => Token::Count,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            _ => Token::Identifier(ident),
        }
    }

    fn current_char(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn peek_char(&self) -> char {
        self.input.get(self.position + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(sql: &str) -> Vec<Token> {
        Lexer::new(sql).tokenize().unwrap()
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            lex(">= <= != <> = > <"),
            vec![
                Token::GreaterEqual,
                Token::LessEqual,
                Token::NotEqual,
                Token::NotEqual,
                Token::Equal,
                Token::Greater,
                Token::Less,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            lex("select From wHeRe"),
            vec![Token::Select, Token::From, Token::Where, Token::Eof]
        );
    }

    #[test]
    fn test_negative_and_decimal_numbers() {
        assert_eq!(
            lex("-5 999.99"),
            vec![
                Token::Number("-5".into()),
                Token::Number("999.99".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }
}
