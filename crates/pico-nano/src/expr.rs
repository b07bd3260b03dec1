//! Selection / weight / variable expressions over tree branches.
//!
//! Expressions are compiled once per draw and evaluated per event. The
//! grammar covers arithmetic (`+ - * / %`), comparisons
//! (`== != < <= > >=`), boolean logic (`&& || !`) and a small set of
//! functions (`abs sqrt log exp pow min max`). Identifiers are branch
//! names; comparisons and boolean operators evaluate to `1.0` / `0.0`.

use pico_core::{Error, Result};

// ── tokens ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Tok>> {
    let mut toks = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                toks.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let two = bytes.get(i + 1) == Some(&b'=');
                toks.push(match (c, two) {
                    ('=', true) => Tok::Eq,
                    ('!', true) => Tok::Ne,
                    ('<', true) => Tok::Le,
                    ('>', true) => Tok::Ge,
                    ('<', false) => Tok::Lt,
                    ('>', false) => Tok::Gt,
                    ('!', false) => Tok::Bang,
                    ('=', false) => {
                        return Err(Error::Expression(format!("stray '=' in expression: {input}")));
                    }
                    _ => unreachable!(),
                });
                i += if two { 2 } else { 1 };
            }
            '&' | '|' => {
                if bytes.get(i + 1) == Some(&(c as u8)) {
                    toks.push(if c == '&' { Tok::AndAnd } else { Tok::OrOr });
                    i += 2;
                } else {
                    return Err(Error::Expression(format!("stray '{c}' in expression: {input}")));
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // scientific notation
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &input[start..i];
                let num = text
                    .parse::<f64>()
                    .map_err(|_| Error::Expression(format!("bad number '{text}'")))?;
                toks.push(Tok::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                toks.push(Tok::Ident(input[start..i].to_string()));
            }
            other => {
                return Err(Error::Expression(format!("unexpected character '{other}' in: {input}")));
            }
        }
    }
    Ok(toks)
}

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Left binding power; higher binds tighter.
    fn power(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn arity(self) -> usize {
        match self {
            Func::Abs | Func::Sqrt | Func::Log | Func::Exp => 1,
            Func::Pow | Func::Min | Func::Max => 2,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Num(f64),
    Branch(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

// ── compiled expression ────────────────────────────────────────

/// A compiled expression, ready for per-row or bulk evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    root: Node,
    /// Branch names referenced, ordered by first occurrence.
    pub branches: Vec<String>,
    /// Source text the expression was compiled from.
    pub source: String,
}

struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
    branches: Vec<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        match self.bump() {
            Some(ref t) if t == tok => Ok(()),
            other => Err(Error::Expression(format!("expected {tok:?}, found {other:?}"))),
        }
    }

    fn binop_at(&self) -> Option<BinOp> {
        Some(match self.peek()? {
            Tok::Plus => BinOp::Add,
            Tok::Minus => BinOp::Sub,
            Tok::Star => BinOp::Mul,
            Tok::Slash => BinOp::Div,
            Tok::Percent => BinOp::Rem,
            Tok::Eq => BinOp::Eq,
            Tok::Ne => BinOp::Ne,
            Tok::Lt => BinOp::Lt,
            Tok::Le => BinOp::Le,
            Tok::Gt => BinOp::Gt,
            Tok::Ge => BinOp::Ge,
            Tok::AndAnd => BinOp::And,
            Tok::OrOr => BinOp::Or,
            _ => return None,
        })
    }

    /// Precedence-climbing expression parser.
    fn expr(&mut self, min_power: u8) -> Result<Node> {
        let mut lhs = self.atom()?;
        while let Some(op) = self.binop_at() {
            if op.power() < min_power {
                break;
            }
            self.bump();
            let rhs = self.expr(op.power() + 1)?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<Node> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Node::Num(n)),
            Some(Tok::Minus) => Ok(Node::Neg(Box::new(self.atom()?))),
            Some(Tok::Bang) => Ok(Node::Not(Box::new(self.atom()?))),
            Some(Tok::LParen) => {
                let inner = self.expr(0)?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => {
                if self.peek() == Some(&Tok::LParen) {
                    let func = match name.as_str() {
                        "abs" => Func::Abs,
                        "sqrt" => Func::Sqrt,
                        "log" => Func::Log,
                        "exp" => Func::Exp,
                        "pow" => Func::Pow,
                        "min" => Func::Min,
                        "max" => Func::Max,
                        _ => return Err(Error::Expression(format!("unknown function '{name}'"))),
                    };
                    self.bump(); // (
                    let mut args = Vec::new();
                    if self.peek() != Some(&Tok::RParen) {
                        loop {
                            args.push(self.expr(0)?);
                            if self.peek() == Some(&Tok::Comma) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Tok::RParen)?;
                    if args.len() != func.arity() {
                        return Err(Error::Expression(format!(
                            "function '{name}' takes {} argument(s), got {}",
                            func.arity(),
                            args.len()
                        )));
                    }
                    Ok(Node::Call(func, args))
                } else {
                    let idx = match self.branches.iter().position(|b| b == &name) {
                        Some(i) => i,
                        None => {
                            self.branches.push(name);
                            self.branches.len() - 1
                        }
                    };
                    Ok(Node::Branch(idx))
                }
            }
            other => Err(Error::Expression(format!("unexpected token {other:?}"))),
        }
    }
}

fn eval(node: &Node, row: &[f64]) -> f64 {
    match node {
        Node::Num(n) => *n,
        Node::Branch(i) => row[*i],
        Node::Neg(a) => -eval(a, row),
        Node::Not(a) => {
            if eval(a, row) > 0.0 { 0.0 } else { 1.0 }
        }
        Node::Bin(op, a, b) => {
            let x = eval(a, row);
            // Short-circuit boolean operators.
            match op {
                BinOp::And if x <= 0.0 => return 0.0,
                BinOp::Or if x > 0.0 => return 1.0,
                _ => {}
            }
            let y = eval(b, row);
            let truth = |b: bool| if b { 1.0 } else { 0.0 };
            match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => x / y,
                BinOp::Rem => x % y,
                BinOp::Eq => truth(x == y),
                BinOp::Ne => truth(x != y),
                BinOp::Lt => truth(x < y),
                BinOp::Le => truth(x <= y),
                BinOp::Gt => truth(x > y),
                BinOp::Ge => truth(x >= y),
                BinOp::And => truth(y > 0.0),
                BinOp::Or => truth(y > 0.0),
            }
        }
        Node::Call(f, args) => {
            let a = eval(&args[0], row);
            match f {
                Func::Abs => a.abs(),
                Func::Sqrt => a.sqrt(),
                Func::Log => a.ln(),
                Func::Exp => a.exp(),
                Func::Pow => a.powf(eval(&args[1], row)),
                Func::Min => a.min(eval(&args[1], row)),
                Func::Max => a.max(eval(&args[1], row)),
            }
        }
    }
}

impl CompiledExpr {
    /// Parse and compile an expression string.
    pub fn compile(input: &str) -> Result<Self> {
        let toks = lex(input)?;
        if toks.is_empty() {
            return Err(Error::Expression("empty expression".into()));
        }
        let mut parser = Parser { toks: &toks, pos: 0, branches: Vec::new() };
        let root = parser.expr(0)?;
        if parser.pos < toks.len() {
            return Err(Error::Expression(format!(
                "trailing tokens after expression: {input}"
            )));
        }
        Ok(CompiledExpr { root, branches: parser.branches, source: input.to_string() })
    }

    /// Evaluate for one row; `row` is ordered like [`Self::branches`].
    pub fn eval_row(&self, row: &[f64]) -> f64 {
        eval(&self.root, row)
    }

    /// Evaluate for all rows of the given columns (ordered like
    /// [`Self::branches`]). A constant expression broadcasts to `n` rows.
    pub fn eval_bulk(&self, columns: &[&[f64]], n: usize) -> Vec<f64> {
        if columns.is_empty() {
            return vec![eval(&self.root, &[]); n];
        }
        let mut row = vec![0.0; columns.len()];
        (0..n)
            .map(|i| {
                for (j, col) in columns.iter().enumerate() {
                    row[j] = col[i];
                }
                eval(&self.root, &row)
            })
            .collect()
    }
}

impl std::fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
