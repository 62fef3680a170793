use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Multi-char operators (must come before single-char)
    #[token("<-")]
    Gen,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("=~")]
    Matches,
    #[token("++")]
    Concat,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    // Single-char operators
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,

    // Literals
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    // Double-quoted strings with the usual escapes
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    Text(String),

    // Back-tick strings are raw
    #[regex(r"`[^`]*`", |lex| {
        let s = lex.slice();
        Some(s[1..s.len() - 1].to_string())
    })]
    Raw(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),
}

fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected input '{snippet}'")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
}

/// Lex an expression into tokens with byte spans.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                return Err(LexError {
                    position: span.start,
                    snippet: source[span].to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

/// Maps byte offsets to 1-based line/column positions.
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> SourceMap {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceMap { line_starts }
    }

    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_operators_longest_first() {
        assert_eq!(
            kinds("<- <= >= == != =~ ++ && || < >"),
            vec![
                Token::Gen,
                Token::LessEq,
                Token::GreaterEq,
                Token::EqEq,
                Token::NotEq,
                Token::Matches,
                Token::Concat,
                Token::AndAnd,
                Token::OrOr,
                Token::Less,
                Token::Greater,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(kinds("1 3.1415 1e7 1.2e-3"), vec![
            Token::Number(1.0),
            Token::Number(3.1415),
            Token::Number(1e7),
            Token::Number(1.2e-3),
        ]);
    }

    #[test]
    fn lex_strings_and_escapes() {
        assert_eq!(kinds(r#""hello""#), vec![Token::Text("hello".into())]);
        assert_eq!(kinds(r#""\"foo\"""#), vec![Token::Text("\"foo\"".into())]);
        assert_eq!(kinds("`raw \\n`"), vec![Token::Raw("raw \\n".into())]);
    }

    #[test]
    fn lex_keywords_vs_idents() {
        assert_eq!(kinds("true false truex"), vec![
            Token::True,
            Token::False,
            Token::Ident("truex".into()),
        ]);
    }

    #[test]
    fn lex_comprehension() {
        assert_eq!(kinds("[i | i <- xs, i != 2]"), vec![
            Token::LBracket,
            Token::Ident("i".into()),
            Token::Pipe,
            Token::Ident("i".into()),
            Token::Gen,
            Token::Ident("xs".into()),
            Token::Comma,
            Token::Ident("i".into()),
            Token::NotEq,
            Token::Number(2.0),
            Token::RBracket,
        ]);
    }

    #[test]
    fn lex_error_reports_position() {
        let err = lex("1 + #").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(err.snippet, "#");
    }

    #[test]
    fn source_map_lookup() {
        let sm = SourceMap::new("ab\ncd");
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.lookup(2), (1, 3));
        assert_eq!(sm.lookup(3), (2, 1));
        assert_eq!(sm.lookup(4), (2, 2));
    }
}
