//! Recursive-descent parser for Mx*.
//!
//! Expressions use precedence climbing over the C operator table. Each
//! expression node receives a fresh `NodeId` so the checker can type it in a
//! side table.

use crate::error::{MxcError, Result};

use super::ast::*;
use super::token::{Tok, Token};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: NodeId,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            next_id: 0,
        }
    }

    pub fn parse_program(mut self) -> Result<Program> {
        let mut items = Vec::new();
        while !self.at(&Tok::Eof) {
            items.push(self.parse_item()?);
        }
        Ok(Program { items })
    }

    // --- token plumbing ---

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn bump(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', found '{}'", tok, self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.err(format!("expected identifier, found '{}'", other))),
        }
    }

    fn err(&self, msg: String) -> MxcError {
        MxcError::Parse {
            line: self.line(),
            msg,
        }
    }

    fn mk(&mut self, line: u32, kind: ExprKind) -> Expr {
        let id = self.next_id;
        self.next_id += 1;
        Expr { id, line, kind }
    }

    // --- items ---

    fn parse_item(&mut self) -> Result<Item> {
        if self.at(&Tok::KwClass) {
            return Ok(Item::Class(self.parse_class()?));
        }
        let line = self.line();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        if self.at(&Tok::LParen) {
            Ok(Item::Func(self.parse_func_rest(ty, name, line)?))
        } else {
            Ok(Item::Global(self.parse_var_decl_rest(ty, name, line)?))
        }
    }

    fn parse_type(&mut self) -> Result<TypeNode> {
        let mut ty = match self.bump() {
            Tok::KwInt => TypeNode::Int,
            Tok::KwBool => TypeNode::Bool,
            Tok::KwString => TypeNode::Str,
            Tok::KwVoid => TypeNode::Void,
            Tok::Ident(name) => TypeNode::Class(name),
            other => return Err(self.err(format!("expected type, found '{}'", other))),
        };
        while self.at(&Tok::LBracket) && self.peek_at(1) == &Tok::RBracket {
            self.bump();
            self.bump();
            ty = TypeNode::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_func_rest(&mut self, ret: TypeNode, name: String, line: u32) -> Result<FuncDecl> {
        self.expect(&Tok::LParen)?;
        let mut params = Vec::new();
        if !self.at(&Tok::RParen) {
            loop {
                let pty = self.parse_type()?;
                let pname = self.expect_ident()?;
                params.push((pty, pname));
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(&Tok::RParen)?;
        let body = self.parse_block()?;
        Ok(FuncDecl {
            name,
            ret,
            params,
            body,
            line,
        })
    }

    fn parse_var_decl_rest(&mut self, ty: TypeNode, name: String, line: u32) -> Result<VarDecl> {
        let mut vars = Vec::new();
        let init = if self.eat(&Tok::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        vars.push((name, init));
        while self.eat(&Tok::Comma) {
            let name = self.expect_ident()?;
            let init = if self.eat(&Tok::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            vars.push((name, init));
        }
        self.expect(&Tok::Semi)?;
        Ok(VarDecl { ty, vars, line })
    }

    fn parse_class(&mut self) -> Result<ClassDecl> {
        let line = self.line();
        self.expect(&Tok::KwClass)?;
        let name = self.expect_ident()?;
        self.expect(&Tok::LBrace)?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut ctor: Option<FuncDecl> = None;
        while !self.eat(&Tok::RBrace) {
            let member_line = self.line();
            // `Name(...)` with Name == class name is the constructor.
            if let Tok::Ident(member) = self.peek().clone() {
                if member == name && self.peek_at(1) == &Tok::LParen {
                    self.bump();
                    let c = self.parse_func_rest(TypeNode::Void, member, member_line)?;
                    if ctor.is_some() {
                        return Err(self.err(format!("class '{}' has multiple constructors", name)));
                    }
                    ctor = Some(c);
                    continue;
                }
            }
            let ty = self.parse_type()?;
            let member = self.expect_ident()?;
            if self.at(&Tok::LParen) {
                methods.push(self.parse_func_rest(ty, member, member_line)?);
            } else {
                fields.push(self.parse_var_decl_rest(ty, member, member_line)?);
            }
        }
        self.eat(&Tok::Semi);
        Ok(ClassDecl {
            name,
            fields,
            methods,
            ctor,
            line,
        })
    }

    // --- statements ---

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&Tok::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(&Tok::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    /// Whether the upcoming tokens start a variable declaration rather than
    /// an expression. A leading type keyword always does; an identifier does
    /// when followed by another identifier or by `[]` then an identifier.
    fn starts_decl(&self) -> bool {
        match self.peek() {
            Tok::KwInt | Tok::KwBool | Tok::KwString => true,
            Tok::Ident(_) => {
                let mut i = 1;
                while self.peek_at(i) == &Tok::LBracket && self.peek_at(i + 1) == &Tok::RBracket {
                    i += 2;
                }
                matches!(self.peek_at(i), Tok::Ident(_))
            }
            _ => false,
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let line = self.line();
        match self.peek() {
            Tok::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Tok::KwIf => {
                self.bump();
                self.expect(&Tok::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                let then = self.parse_stmt_as_block()?;
                let els = if self.eat(&Tok::KwElse) {
                    Some(self.parse_stmt_as_block()?)
                } else {
                    None
                };
                Ok(Stmt::If { cond, then, els })
            }
            Tok::KwWhile => {
                self.bump();
                self.expect(&Tok::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                let body = self.parse_stmt_as_block()?;
                Ok(Stmt::While { cond, body })
            }
            Tok::KwFor => {
                self.bump();
                self.expect(&Tok::LParen)?;
                let init = if self.at(&Tok::Semi) {
                    self.bump();
                    None
                } else if self.starts_decl() {
                    let dline = self.line();
                    let ty = self.parse_type()?;
                    let name = self.expect_ident()?;
                    Some(Box::new(Stmt::Decl(self.parse_var_decl_rest(ty, name, dline)?)))
                } else {
                    let e = self.parse_expr()?;
                    self.expect(&Tok::Semi)?;
                    Some(Box::new(Stmt::Expr(Some(e))))
                };
                let cond = if self.at(&Tok::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Tok::Semi)?;
                let step = if self.at(&Tok::RParen) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Tok::RParen)?;
                let body = self.parse_stmt_as_block()?;
                Ok(Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                })
            }
            Tok::KwBreak => {
                self.bump();
                self.expect(&Tok::Semi)?;
                Ok(Stmt::Break(line))
            }
            Tok::KwContinue => {
                self.bump();
                self.expect(&Tok::Semi)?;
                Ok(Stmt::Continue(line))
            }
            Tok::KwReturn => {
                self.bump();
                let value = if self.at(&Tok::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Tok::Semi)?;
                Ok(Stmt::Return(value, line))
            }
            Tok::Semi => {
                self.bump();
                Ok(Stmt::Expr(None))
            }
            _ if self.starts_decl() => {
                let ty = self.parse_type()?;
                let name = self.expect_ident()?;
                Ok(Stmt::Decl(self.parse_var_decl_rest(ty, name, line)?))
            }
            _ => {
                let e = self.parse_expr()?;
                self.expect(&Tok::Semi)?;
                Ok(Stmt::Expr(Some(e)))
            }
        }
    }

    /// A statement in a control-flow body position, normalized to a block.
    fn parse_stmt_as_block(&mut self) -> Result<Vec<Stmt>> {
        if self.at(&Tok::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    // --- expressions ---

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let line = self.line();
        let lhs = self.parse_binary(0)?;
        if self.eat(&Tok::Assign) {
            if !lhs.is_lvalue() {
                return Err(MxcError::Parse {
                    line,
                    msg: "assignment target is not an lvalue".into(),
                });
            }
            let value = self.parse_expr()?;
            return Ok(self.mk(
                line,
                ExprKind::Assign {
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
            ));
        }
        Ok(lhs)
    }

    fn binop_at(&self, level: u8) -> Option<AstBinOp> {
        let op = match (level, self.peek()) {
            (0, Tok::OrOr) => AstBinOp::LogOr,
            (1, Tok::AndAnd) => AstBinOp::LogAnd,
            (2, Tok::Pipe) => AstBinOp::BitOr,
            (3, Tok::Caret) => AstBinOp::BitXor,
            (4, Tok::Amp) => AstBinOp::BitAnd,
            (5, Tok::EqEq) => AstBinOp::Eq,
            (5, Tok::NotEq) => AstBinOp::Ne,
            (6, Tok::Lt) => AstBinOp::Lt,
            (6, Tok::Le) => AstBinOp::Le,
            (6, Tok::Gt) => AstBinOp::Gt,
            (6, Tok::Ge) => AstBinOp::Ge,
            (7, Tok::Shl) => AstBinOp::Shl,
            (7, Tok::Shr) => AstBinOp::Shr,
            (8, Tok::Plus) => AstBinOp::Add,
            (8, Tok::Minus) => AstBinOp::Sub,
            (9, Tok::Star) => AstBinOp::Mul,
            (9, Tok::Slash) => AstBinOp::Div,
            (9, Tok::Percent) => AstBinOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, level: u8) -> Result<Expr> {
        if level > 9 {
            return self.parse_unary();
        }
        let line = self.line();
        let mut lhs = self.parse_binary(level + 1)?;
        while let Some(op) = self.binop_at(level) {
            self.bump();
            let rhs = self.parse_binary(level + 1)?;
            lhs = self.mk(
                line,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Minus => {
                self.bump();
                // Fold `-literal` so that -2147483648 stays in range.
                if let Tok::Int(v) = self.peek() {
                    let v = *v;
                    self.bump();
                    let folded = self.mk(line, ExprKind::Int(v.wrapping_neg()));
                    return self.parse_postfix_ops(folded);
                }
                let operand = self.parse_unary()?;
                ExprKind::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                }
            }
            Tok::Not => {
                self.bump();
                let operand = self.parse_unary()?;
                ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                }
            }
            Tok::Tilde => {
                self.bump();
                let operand = self.parse_unary()?;
                ExprKind::Unary {
                    op: UnOp::BitNot,
                    operand: Box::new(operand),
                }
            }
            Tok::PlusPlus | Tok::MinusMinus => {
                let inc = self.bump() == Tok::PlusPlus;
                let target = self.parse_unary()?;
                ExprKind::PreIncDec {
                    inc,
                    target: Box::new(target),
                }
            }
            _ => return self.parse_postfix(),
        };
        Ok(self.mk(line, kind))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let primary = self.parse_primary()?;
        self.parse_postfix_ops(primary)
    }

    fn parse_postfix_ops(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            let line = self.line();
            match self.peek() {
                Tok::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(&Tok::RBracket)?;
                    expr = self.mk(
                        line,
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                    );
                }
                Tok::Dot => {
                    self.bump();
                    let member = self.expect_ident()?;
                    if self.at(&Tok::LParen) {
                        let args = self.parse_args()?;
                        expr = self.mk(
                            line,
                            ExprKind::MethodCall {
                                recv: Box::new(expr),
                                method: member,
                                args,
                            },
                        );
                    } else {
                        expr = self.mk(
                            line,
                            ExprKind::Member {
                                recv: Box::new(expr),
                                field: member,
                            },
                        );
                    }
                }
                Tok::PlusPlus | Tok::MinusMinus => {
                    let inc = self.bump() == Tok::PlusPlus;
                    expr = self.mk(
                        line,
                        ExprKind::PostIncDec {
                            inc,
                            target: Box::new(expr),
                        },
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Tok::LParen)?;
        let mut args = Vec::new();
        if !self.at(&Tok::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(&Tok::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let line = self.line();
        let kind = match self.bump() {
            Tok::Int(v) => ExprKind::Int(v),
            Tok::Str(s) => ExprKind::Str(s),
            Tok::KwTrue => ExprKind::Bool(true),
            Tok::KwFalse => ExprKind::Bool(false),
            Tok::KwNull => ExprKind::Null,
            Tok::KwThis => ExprKind::This,
            Tok::Ident(name) => {
                if self.at(&Tok::LParen) {
                    let args = self.parse_args()?;
                    ExprKind::Call { callee: name, args }
                } else {
                    ExprKind::Ident(name)
                }
            }
            Tok::LParen => {
                let e = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                return Ok(e);
            }
            Tok::KwNew => return self.parse_new(line),
            other => return Err(self.err(format!("expected expression, found '{}'", other))),
        };
        Ok(self.mk(line, kind))
    }

    fn parse_new(&mut self, line: u32) -> Result<Expr> {
        let base = match self.bump() {
            Tok::KwInt => TypeNode::Int,
            Tok::KwBool => TypeNode::Bool,
            Tok::KwString => TypeNode::Str,
            Tok::Ident(name) => TypeNode::Class(name),
            other => return Err(self.err(format!("expected type after 'new', found '{}'", other))),
        };

        if self.at(&Tok::LBracket) {
            let mut dims = Vec::new();
            let mut seen_empty = false;
            while self.eat(&Tok::LBracket) {
                if self.eat(&Tok::RBracket) {
                    seen_empty = true;
                    dims.push(None);
                } else {
                    if seen_empty {
                        return Err(MxcError::Parse {
                            line,
                            msg: "array dimension after an omitted dimension".into(),
                        });
                    }
                    let d = self.parse_expr()?;
                    self.expect(&Tok::RBracket)?;
                    dims.push(Some(d));
                }
            }
            return Ok(self.mk(line, ExprKind::NewArray { elem: base, dims }));
        }

        match base {
            TypeNode::Class(class) => {
                let args = if self.at(&Tok::LParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                Ok(self.mk(line, ExprKind::NewObject { class, args }))
            }
            _ => Err(MxcError::Parse {
                line,
                msg: "'new' on a scalar type requires array dimensions".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn test_parse_function() {
        let prog = parse("int add(int a, int b) { return a + b; }");
        assert_eq!(prog.items.len(), 1);
        match &prog.items[0] {
            Item::Func(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.body.len(), 1);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_class_with_ctor() {
        let prog = parse("class P { int x; P(int v) { x = v; } int get() { return x; } }");
        match &prog.items[0] {
            Item::Class(c) => {
                assert_eq!(c.name, "P");
                assert_eq!(c.fields.len(), 1);
                assert_eq!(c.methods.len(), 1);
                assert!(c.ctor.is_some());
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let prog = parse("int main() { int x = 1 + 2 * 3; return x; }");
        let Item::Func(f) = &prog.items[0] else {
            panic!()
        };
        let Stmt::Decl(d) = &f.body[0] else { panic!() };
        let init = d.vars[0].1.as_ref().unwrap();
        // `1 + (2 * 3)`: the top node must be Add.
        match &init.kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(*op, AstBinOp::Add);
                assert!(matches!(
                    rhs.kind,
                    ExprKind::Binary {
                        op: AstBinOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_new_array_dims() {
        let prog = parse("int main() { int[][] a = new int[5][]; return 0; }");
        let Item::Func(f) = &prog.items[0] else {
            panic!()
        };
        let Stmt::Decl(d) = &f.body[0] else { panic!() };
        match &d.vars[0].1.as_ref().unwrap().kind {
            ExprKind::NewArray { dims, .. } => {
                assert_eq!(dims.len(), 2);
                assert!(dims[0].is_some());
                assert!(dims[1].is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_dim_after_omitted() {
        let tokens = Lexer::new("int main() { int[][] a = new int[][3]; return 0; }")
            .tokenize()
            .unwrap();
        assert!(Parser::new(tokens).parse_program().is_err());
    }

    #[test]
    fn test_for_and_incdec() {
        let prog = parse("int main() { int s = 0; for (int i = 0; i < 10; i++) s = s + i; return s; }");
        let Item::Func(f) = &prog.items[0] else {
            panic!()
        };
        assert!(matches!(f.body[1], Stmt::For { .. }));
    }

    #[test]
    fn test_negative_int_min() {
        let prog = parse("int main() { return -2147483648; }");
        let Item::Func(f) = &prog.items[0] else {
            panic!()
        };
        let Stmt::Return(Some(e), _) = &f.body[0] else {
            panic!()
        };
        assert_eq!(e.kind, ExprKind::Int(i32::MIN));
    }
}
