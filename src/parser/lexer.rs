// src/parser/lexer.rs
use logos::Logos;

/// Tokens of the textual IR. The format is line-oriented: every instruction
/// and every block label sits on its own line, so newlines are tokens.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
pub enum TokenKind {
    #[token("function")]
    Function,

    #[token("data")]
    Data,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token("=")]
    Assign,

    #[token("\n")]
    Newline,

    /// `%name` or `%name:version`.
    #[regex(r"%[0-9a-zA-Z_]+(:[0-9]+)?", |lex| lex.slice().to_owned())]
    Variable(String),

    /// `@name` or `@"escaped name"`.
    #[regex(r#"@([0-9a-zA-Z_]+|"[^"\n]*")"#, |lex| lex.slice().to_owned())]
    LabelRef(String),

    /// A bare quoted name (function headers and label definitions).
    #[regex(r#""[^"\n]*""#, |lex| lex.slice().to_owned())]
    Quoted(String),

    /// Opcodes, bare labels and decimal/hex literals; classified by the
    /// parser from context.
    #[regex(r"(0x[0-9a-fA-F]+|[0-9a-zA-Z_]+)", |lex| lex.slice().to_owned())]
    Word(String),
}

/// Tokenizes a source string, pairing each token with its 1-based line.
/// Returns `Err` with the offending line on an unrecognized character.
pub fn tokenize(source: &str) -> Result<Vec<(TokenKind, usize)>, usize> {
    let mut tokens = Vec::new();
    let mut line = 1;
    for (token, _span) in TokenKind::lexer(source).spanned() {
        match token {
            Ok(token) => {
                let is_newline = token == TokenKind::Newline;
                tokens.push((token, line));
                if is_newline {
                    line += 1;
                }
            }
            Err(()) => return Err(line),
        }
    }
    Ok(tokens)
}
