//! Tokens of the surface syntax, produced with logos.
//!
//! Newlines are significant (they end statements) and are emitted as
//! tokens; other whitespace and `#` comments are skipped.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"\\\r?\n")]
pub enum Token {
    #[token("\n")]
    Newline,

    // === Keywords ===
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("inf")]
    Inf,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("step")]
    Step,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("shape")]
    Shape,
    #[token("function")]
    Function,
    #[token("recordable")]
    Recordable,
    #[token("integer")]
    IntegerType,
    #[token("real")]
    RealType,
    #[token("boolean")]
    BooleanType,
    #[token("string")]
    StringType,
    #[token("void")]
    VoidType,

    // === Literals and names ===
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    // === Punctuation ===
    #[token("'")]
    Tick,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("?")]
    Question,
    #[token("...")]
    Ellipsis,
    #[token("<-")]
    LArrow,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token("==")]
    EqEq,
    #[token("!=")]
    #[token("<>")]
    Ne,
    #[token(">=")]
    Ge,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
}

/// Whether `name` occurs in `text` as a whole identifier token.
///
/// `tau` matches in `exp(-t/tau)` but not in `tau_syn`.
pub fn contains_identifier(text: &str, name: &str) -> bool {
    Token::lexer(text).any(|token| matches!(token, Ok(Token::Ident(ident)) if ident == name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Token::lexer(source).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            lex("V_m mV = -70.0 mV # membrane"),
            vec![
                Token::Ident("V_m".into()),
                Token::Ident("mV".into()),
                Token::Assign,
                Token::Minus,
                Token::Float(70.0),
                Token::Ident("mV".into()),
            ]
        );
    }

    #[test]
    fn test_ticks_and_operators() {
        assert_eq!(
            lex("g'' = -g'/tau**2\n"),
            vec![
                Token::Ident("g".into()),
                Token::Tick,
                Token::Tick,
                Token::Assign,
                Token::Minus,
                Token::Ident("g".into()),
                Token::Tick,
                Token::Slash,
                Token::Ident("tau".into()),
                Token::StarStar,
                Token::Integer(2),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_keywords_win_over_identifiers() {
        assert_eq!(lex("real"), vec![Token::RealType]);
        assert_eq!(lex("reals"), vec![Token::Ident("reals".into())]);
        assert_eq!(lex("spikes nS <- spike"), vec![
            Token::Ident("spikes".into()),
            Token::Ident("nS".into()),
            Token::LArrow,
            Token::Ident("spike".into()),
        ]);
    }

    #[test]
    fn test_contains_identifier_respects_word_boundaries() {
        assert!(contains_identifier("exp(-t/tau)", "tau"));
        assert!(!contains_identifier("exp(-t/tau_syn)", "tau"));
        assert!(!contains_identifier("I_syn + 1", "I"));
        assert!(contains_identifier("(I_syn) * 2", "I_syn"));
    }
}
