//! Recursive-descent parser for associative script text.

use crate::ast::{Args, BinaryOp, Expr, FunctionDef, Program, Stmt, StmtKind, UnaryOp};
use crate::errors::{Result, RunnerError, SourceLocation};

use super::lexer::{Lexer, Token, TokenKind};

/// Deepest bracket, parenthesis or prefix-operator nesting accepted.
pub const MAX_NESTING: usize = 64;

/// Tallest expression tree accepted. Evaluation, printing and dropping a
/// tree all recurse over its height.
pub const MAX_HEIGHT: usize = 256;

/// Parse a code segment into statements.
///
/// The final statement may omit its `;`.
pub fn parse_program(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).program()
}

/// Parse a single expression, rejecting trailing input.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expr()?.expr;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a comma separated argument list such as `a, 2, "x"`.
pub fn parse_arguments(source: &str) -> Result<Args> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let mut args = Args::new();
    if parser.check(&TokenKind::Eof) {
        return Ok(args);
    }
    loop {
        args.push(parser.expr()?.expr);
        if !parser.eat(&TokenKind::Comma) {
            break;
        }
    }
    parser.expect_eof()?;
    Ok(args)
}

/// An expression and the height of its tree.
struct Parsed {
    expr: Expr,
    height: usize,
}

impl Parsed {
    fn leaf(expr: Expr) -> Self {
        Self { expr, height: 1 }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn location(&self) -> SourceLocation {
        self.tokens[self.pos].location
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn unexpected(&self, expected: &str) -> RunnerError {
        RunnerError::syntax(
            format!("expected {}, found {}", expected, self.peek().describe()),
            self.location(),
        )
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_NESTING {
            return Err(RunnerError::syntax(
                format!("expression nested deeper than {} levels", MAX_NESTING),
                self.location(),
            ));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    /// Wrap `expr` as the parent of children at most `below` high.
    fn node(&self, expr: Expr, below: usize) -> Result<Parsed> {
        let height = below + 1;
        if height > MAX_HEIGHT {
            return Err(RunnerError::syntax(
                format!("expression taller than {} levels", MAX_HEIGHT),
                self.location(),
            ));
        }
        Ok(Parsed { expr, height })
    }

    fn program(&mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if self.check(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.stmt()?);
        }
        Ok(Program { stmts })
    }

    fn stmt(&mut self) -> Result<Stmt> {
        let location = self.location();
        let kind = match self.peek() {
            TokenKind::Import => self.import()?,
            TokenKind::Def => self.function_def()?,
            TokenKind::Ident(_) if self.peek_at(1) == &TokenKind::Assign => {
                let target = self.expect_ident("identifier")?;
                self.advance();
                StmtKind::Assign {
                    target,
                    value: self.expr()?.expr,
                }
            }
            _ => StmtKind::Expr(self.expr()?.expr),
        };
        self.end_of_stmt()?;
        Ok(Stmt::new(kind, location))
    }

    fn end_of_stmt(&mut self) -> Result<()> {
        if self.eat(&TokenKind::Semicolon) || self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    fn import(&mut self) -> Result<StmtKind> {
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after import")?;
        let library = match self.peek().clone() {
            TokenKind::Str(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected("library name string")),
        };
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(StmtKind::Import { library })
    }

    fn function_def(&mut self) -> Result<StmtKind> {
        self.advance();
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param = self.expect_ident("parameter name")?;
                if params.contains(&param) {
                    return Err(RunnerError::syntax(
                        format!("duplicate parameter '{}'", param),
                        self.location(),
                    ));
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::Assign, "'=' before function body")?;
        let body = self.expr()?.expr;

        Ok(StmtKind::FunctionDef(FunctionDef { name, params, body }))
    }

    fn expr(&mut self) -> Result<Parsed> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Parsed> {
        let cond = self.or()?;
        if self.eat(&TokenKind::Question) {
            let then = self.expr()?;
            self.expect(&TokenKind::Colon, "':' in conditional")?;
            let otherwise = self.expr()?;
            let below = cond.height.max(then.height).max(otherwise.height);
            return self.node(
                Expr::Conditional {
                    cond: Box::new(cond.expr),
                    then: Box::new(then.expr),
                    otherwise: Box::new(otherwise.expr),
                },
                below,
            );
        }
        Ok(cond)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Parsed>,
        ops: &[(TokenKind, BinaryOp)],
    ) -> Result<Parsed> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let rhs = next(self)?;
                    let below = lhs.height.max(rhs.height);
                    lhs = self.node(Expr::binary(*op, lhs.expr, rhs.expr), below)?;
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn or(&mut self) -> Result<Parsed> {
        self.binary_level(Self::and, &[(TokenKind::OrOr, BinaryOp::Or)])
    }

    fn and(&mut self) -> Result<Parsed> {
        self.binary_level(Self::equality, &[(TokenKind::AndAnd, BinaryOp::And)])
    }

    fn equality(&mut self) -> Result<Parsed> {
        self.binary_level(
            Self::compare,
            &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::NotEq, BinaryOp::Ne)],
        )
    }

    fn compare(&mut self) -> Result<Parsed> {
        self.binary_level(
            Self::range,
            &[
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Ge, BinaryOp::Ge),
                (TokenKind::Gt, BinaryOp::Gt),
            ],
        )
    }

    fn range(&mut self) -> Result<Parsed> {
        let start = self.additive()?;
        if self.eat(&TokenKind::DotDot) {
            let end = self.additive()?;
            let below = start.height.max(end.height);
            return self.node(
                Expr::Range {
                    start: Box::new(start.expr),
                    end: Box::new(end.expr),
                },
                below,
            );
        }
        Ok(start)
    }

    fn additive(&mut self) -> Result<Parsed> {
        self.binary_level(
            Self::term,
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
        )
    }

    fn term(&mut self) -> Result<Parsed> {
        self.binary_level(
            Self::unary,
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
        )
    }

    fn unary(&mut self) -> Result<Parsed> {
        let op = if self.eat(&TokenKind::Minus) {
            UnaryOp::Neg
        } else if self.eat(&TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.postfix();
        };
        let operand = self.nested(Self::unary)?;
        self.node(
            Expr::Unary {
                op,
                operand: Box::new(operand.expr),
            },
            operand.height,
        )
    }

    fn postfix(&mut self) -> Result<Parsed> {
        let mut parsed = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_ident("member name after '.'")?;
                if self.check(&TokenKind::LParen) {
                    let (args, args_height) = self.args()?;
                    let below = parsed.height.max(args_height);
                    parsed = self.node(
                        Expr::Call {
                            target: Some(Box::new(parsed.expr)),
                            name,
                            args,
                        },
                        below,
                    )?;
                } else {
                    let below = parsed.height;
                    parsed = self.node(
                        Expr::Member {
                            target: Box::new(parsed.expr),
                            name,
                        },
                        below,
                    )?;
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                let below = parsed.height.max(index.height);
                parsed = self.node(
                    Expr::Index {
                        target: Box::new(parsed.expr),
                        index: Box::new(index.expr),
                    },
                    below,
                )?;
            } else if self.check(&TokenKind::LParen) {
                return Err(RunnerError::syntax(
                    "only named functions and members can be called",
                    self.location(),
                ));
            } else {
                return Ok(parsed);
            }
        }
    }

    /// Comma separated expressions up to `close`, returning the tallest.
    fn list(&mut self, close: &TokenKind, what: &str) -> Result<(Vec<Expr>, usize)> {
        let mut items = Vec::new();
        let mut height = 0;
        if !self.check(close) {
            loop {
                let item = self.expr()?;
                height = height.max(item.height);
                items.push(item.expr);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(close, what)?;
        Ok((items, height))
    }

    fn args(&mut self) -> Result<(Args, usize)> {
        self.expect(&TokenKind::LParen, "'('")?;
        self.list(&TokenKind::RParen, "')' after arguments")
    }

    fn primary(&mut self) -> Result<Parsed> {
        let location = self.location();
        match self.advance() {
            TokenKind::Int(i) => Ok(Parsed::leaf(Expr::Int(i))),
            TokenKind::Double(d) => Ok(Parsed::leaf(Expr::Double(d))),
            TokenKind::Str(s) => Ok(Parsed::leaf(Expr::Str(s))),
            TokenKind::True => Ok(Parsed::leaf(Expr::Bool(true))),
            TokenKind::False => Ok(Parsed::leaf(Expr::Bool(false))),
            TokenKind::Null => Ok(Parsed::leaf(Expr::Null)),
            TokenKind::Ident(name) => {
                if self.check(&TokenKind::LParen) {
                    let (args, below) = self.args()?;
                    self.node(
                        Expr::Call {
                            target: None,
                            name,
                            args,
                        },
                        below,
                    )
                } else {
                    Ok(Parsed::leaf(Expr::Ident(name)))
                }
            }
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let (items, below) = self.list(&TokenKind::RBracket, "']'")?;
                self.node(Expr::Array(items), below)
            }
            other => Err(RunnerError::syntax(
                format!("expected expression, found {}", other.describe()),
                location,
            )),
        }
    }
}
