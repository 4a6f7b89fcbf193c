use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifiers and keywords; the parser tells them apart
    Word(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    /// Integer literal
    Int(i64),
    /// Decimal literal, kept as written
    Float(String),
    // Punctuation
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Dot,
    Semi,
    // Assignment and comparison
    Assign,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Logical
    Bang,
    AndAnd,
    OrOr,
    // End of input
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0usize;
    let mut line: u32 = 1;

    while pos < chars.len() {
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();

        // Line comment: `//` or `#`
        if (c == '/' && next == Some('/')) || c == '#' {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }

        // Block comment
        if c == '/' && next == Some('*') {
            pos += 2;
            loop {
                if pos >= chars.len() {
                    return Err(ScriptError::lex(line, "unterminated block comment"));
                }
                if chars[pos] == '\n' {
                    line += 1;
                }
                if chars[pos] == '*' && chars.get(pos + 1) == Some(&'/') {
                    pos += 2;
                    break;
                }
                pos += 1;
            }
            continue;
        }

        if c.is_whitespace() {
            if c == '\n' {
                line += 1;
            }
            pos += 1;
            continue;
        }

        let tok_line = line;

        // String literal, either quote style
        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                let Some(&sc) = chars.get(pos) else {
                    return Err(ScriptError::lex(tok_line, "unterminated string literal"));
                };
                if sc == quote {
                    pos += 1;
                    break;
                }
                if sc == '\\' {
                    pos += 1;
                    let Some(&escaped) = chars.get(pos) else {
                        return Err(ScriptError::lex(tok_line, "unterminated escape in string"));
                    };
                    match escaped {
                        '"' => s.push('"'),
                        '\'' => s.push('\''),
                        '\\' => s.push('\\'),
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => {
                            return Err(ScriptError::lex(
                                tok_line,
                                format!("unknown escape '\\{}' in string", other),
                            ))
                        }
                    }
                    pos += 1;
                    continue;
                }
                if sc == '\n' {
                    return Err(ScriptError::lex(tok_line, "unterminated string literal"));
                }
                s.push(sc);
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                line: tok_line,
            });
            continue;
        }

        // Number. A leading `-` is always an operator token.
        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            let is_decimal = chars.get(pos) == Some(&'.')
                && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit());
            if is_decimal {
                pos += 1; // consume '.'
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let s: String = chars[start..pos].iter().collect();
                tokens.push(Spanned {
                    token: Token::Float(s),
                    line: tok_line,
                });
            } else {
                let s: String = chars[start..pos].iter().collect();
                let n: i64 = s.parse().map_err(|_| {
                    ScriptError::lex(tok_line, format!("invalid integer '{}'", s))
                })?;
                tokens.push(Spanned {
                    token: Token::Int(n),
                    line: tok_line,
                });
            }
            continue;
        }

        // Two-character operators first
        let pair = match (c, next) {
            ('=', Some('=')) => Some(Token::Eq),
            ('!', Some('=')) => Some(Token::Neq),
            ('<', Some('=')) => Some(Token::Lte),
            ('>', Some('=')) => Some(Token::Gte),
            ('&', Some('&')) => Some(Token::AndAnd),
            ('|', Some('|')) => Some(Token::OrOr),
            _ => None,
        };
        if let Some(token) = pair {
            tokens.push(Spanned {
                token,
                line: tok_line,
            });
            pos += 2;
            continue;
        }

        let single = match c {
            '=' => Some(Token::Assign),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Bang),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            '.' => Some(Token::Dot),
            ';' => Some(Token::Semi),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned {
                token,
                line: tok_line,
            });
            pos += 1;
            continue;
        }

        // Identifier / keyword
        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Word(word),
                line: tok_line,
            });
            continue;
        }

        return Err(ScriptError::lex(
            tok_line,
            format!("unexpected character '{}'", c),
        ));
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}
