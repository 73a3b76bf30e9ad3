//! Semantic checker for Mx*.
//!
//! Two passes: collect class layouts and function signatures, then check
//! every body. The checker resolves each identifier to a declaration, types
//! every expression into a side table keyed by `NodeId`, validates
//! break/continue placement and return paths, and binds the runtime builtins.
//! Downstream passes may assume a checked program is semantically valid.

use rustc_hash::FxHashMap;

use crate::error::{MxcError, Result};

use super::ast::*;

/// A resolved semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemTy {
    Int,
    Bool,
    Str,
    Void,
    /// Type of the `null` literal; assignable to any reference type.
    Null,
    Class(String),
    Array(Box<SemTy>),
}

impl SemTy {
    pub fn is_reference(&self) -> bool {
        matches!(self, SemTy::Str | SemTy::Class(_) | SemTy::Array(_) | SemTy::Null)
    }

    /// Whether a value of type `src` can be bound to a slot of type `self`.
    pub fn accepts(&self, src: &SemTy) -> bool {
        self == src || (src == &SemTy::Null && self.is_reference())
    }
}

impl std::fmt::Display for SemTy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemTy::Int => write!(f, "int"),
            SemTy::Bool => write!(f, "bool"),
            SemTy::Str => write!(f, "string"),
            SemTy::Void => write!(f, "void"),
            SemTy::Null => write!(f, "null"),
            SemTy::Class(name) => write!(f, "{}", name),
            SemTy::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSig {
    pub params: Vec<SemTy>,
    pub ret: SemTy,
}

#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    /// Fields in declaration order; the index is the 4-byte slot index.
    pub fields: Vec<(String, SemTy)>,
    pub methods: FxHashMap<String, FuncSig>,
    pub has_ctor: bool,
}

impl ClassInfo {
    pub fn field(&self, name: &str) -> Option<(usize, &SemTy)> {
        self.fields
            .iter()
            .position(|(f, _)| f == name)
            .map(|i| (i, &self.fields[i].1))
    }
}

/// Result of checking: the expression type table plus the collected
/// signatures the IR builder needs.
#[derive(Debug, Default)]
pub struct Checked {
    pub types: FxHashMap<NodeId, SemTy>,
    pub classes: FxHashMap<String, ClassInfo>,
    pub funcs: FxHashMap<String, FuncSig>,
}

pub fn check(program: &Program) -> Result<Checked> {
    let mut checker = Checker::default();
    checker.collect(program)?;
    checker.check_bodies(program)?;
    Ok(checker.out)
}

#[derive(Default)]
struct Checker {
    out: Checked,
    scopes: Vec<FxHashMap<String, SemTy>>,
    current_class: Option<String>,
    current_ret: SemTy,
    in_ctor: bool,
    loop_depth: u32,
}

impl Default for SemTy {
    fn default() -> Self {
        SemTy::Void
    }
}

fn sem_err(line: u32, msg: impl Into<String>) -> MxcError {
    MxcError::Semantic {
        line,
        msg: msg.into(),
    }
}

impl Checker {
    // --- pass 1: signatures ---

    fn collect(&mut self, program: &Program) -> Result<()> {
        self.install_builtins();

        // Class names first so that field/parameter types can refer to any
        // class regardless of declaration order.
        for item in &program.items {
            if let Item::Class(c) = item {
                if self
                    .out
                    .classes
                    .insert(c.name.clone(), ClassInfo::default())
                    .is_some()
                {
                    return Err(sem_err(c.line, format!("duplicate class '{}'", c.name)));
                }
            }
        }

        for item in &program.items {
            match item {
                Item::Class(c) => self.collect_class(c)?,
                Item::Func(f) => {
                    let sig = self.func_sig(f)?;
                    if self.out.funcs.insert(f.name.clone(), sig).is_some() {
                        return Err(sem_err(f.line, format!("duplicate function '{}'", f.name)));
                    }
                    if self.out.classes.contains_key(&f.name) {
                        return Err(sem_err(
                            f.line,
                            format!("'{}' conflicts with a class name", f.name),
                        ));
                    }
                }
                Item::Global(_) => {}
            }
        }

        match self.out.funcs.get("main") {
            Some(sig) if sig.ret == SemTy::Int && sig.params.is_empty() => Ok(()),
            Some(_) => Err(sem_err(1, "'main' must be declared as 'int main()'")),
            None => Err(sem_err(1, "missing 'int main()'")),
        }
    }

    fn collect_class(&mut self, c: &ClassDecl) -> Result<()> {
        let mut info = ClassInfo {
            has_ctor: c.ctor.is_some(),
            ..ClassInfo::default()
        };
        for decl in &c.fields {
            let ty = self.resolve_type(&decl.ty, decl.line)?;
            if ty == SemTy::Void {
                return Err(sem_err(decl.line, "field of type void"));
            }
            for (name, init) in &decl.vars {
                if init.is_some() {
                    return Err(sem_err(decl.line, "field initializers are not supported"));
                }
                if info.fields.iter().any(|(f, _)| f == name) {
                    return Err(sem_err(
                        decl.line,
                        format!("duplicate field '{}' in class '{}'", name, c.name),
                    ));
                }
                info.fields.push((name.clone(), ty.clone()));
            }
        }
        for m in &c.methods {
            let sig = self.func_sig(m)?;
            if info.methods.insert(m.name.clone(), sig).is_some() {
                return Err(sem_err(
                    m.line,
                    format!("duplicate method '{}' in class '{}'", m.name, c.name),
                ));
            }
        }
        if let Some(ctor) = &c.ctor {
            let sig = self.func_sig(ctor)?;
            info.methods.insert(ctor.name.clone(), sig);
        }
        self.out.classes.insert(c.name.clone(), info);
        Ok(())
    }

    fn func_sig(&self, f: &FuncDecl) -> Result<FuncSig> {
        let ret = self.resolve_type(&f.ret, f.line)?;
        let mut params = Vec::new();
        for (ty, _) in &f.params {
            let ty = self.resolve_type(ty, f.line)?;
            if ty == SemTy::Void {
                return Err(sem_err(f.line, "parameter of type void"));
            }
            params.push(ty);
        }
        Ok(FuncSig { params, ret })
    }

    fn resolve_type(&self, ty: &TypeNode, line: u32) -> Result<SemTy> {
        Ok(match ty {
            TypeNode::Int => SemTy::Int,
            TypeNode::Bool => SemTy::Bool,
            TypeNode::Str => SemTy::Str,
            TypeNode::Void => SemTy::Void,
            TypeNode::Class(name) => {
                if !self.out.classes.contains_key(name) {
                    return Err(sem_err(line, format!("unknown type '{}'", name)));
                }
                SemTy::Class(name.clone())
            }
            TypeNode::Array(elem) => {
                let elem = self.resolve_type(elem, line)?;
                if elem == SemTy::Void {
                    return Err(sem_err(line, "array of void"));
                }
                SemTy::Array(Box::new(elem))
            }
        })
    }

    fn install_builtins(&mut self) {
        let sigs: &[(&str, &[SemTy], SemTy)] = &[
            ("print", &[SemTy::Str], SemTy::Void),
            ("println", &[SemTy::Str], SemTy::Void),
            ("printInt", &[SemTy::Int], SemTy::Void),
            ("printlnInt", &[SemTy::Int], SemTy::Void),
            ("getInt", &[], SemTy::Int),
            ("getString", &[], SemTy::Str),
            ("toString", &[SemTy::Int], SemTy::Str),
        ];
        for (name, params, ret) in sigs {
            self.out.funcs.insert(
                name.to_string(),
                FuncSig {
                    params: params.to_vec(),
                    ret: ret.clone(),
                },
            );
        }
    }

    // --- pass 2: bodies ---

    fn check_bodies(&mut self, program: &Program) -> Result<()> {
        // Globals form the outermost scope, visible to every function.
        self.scopes.push(FxHashMap::default());
        for item in &program.items {
            if let Item::Global(decl) = item {
                let ty = self.resolve_type(&decl.ty, decl.line)?;
                if ty == SemTy::Void {
                    return Err(sem_err(decl.line, "global of type void"));
                }
                for (name, init) in &decl.vars {
                    if let Some(init) = init {
                        let init_ty = self.check_expr(init)?;
                        if !ty.accepts(&init_ty) {
                            return Err(sem_err(
                                decl.line,
                                format!("cannot initialize {} with {}", ty, init_ty),
                            ));
                        }
                    }
                    if self.scopes[0].insert(name.clone(), ty.clone()).is_some() {
                        return Err(sem_err(decl.line, format!("duplicate global '{}'", name)));
                    }
                }
            }
        }

        for item in &program.items {
            match item {
                Item::Func(f) => self.check_func(f, None)?,
                Item::Class(c) => {
                    for m in &c.methods {
                        self.check_func(m, Some(&c.name))?;
                    }
                    if let Some(ctor) = &c.ctor {
                        self.in_ctor = true;
                        self.check_func(ctor, Some(&c.name))?;
                        self.in_ctor = false;
                    }
                }
                Item::Global(_) => {}
            }
        }
        self.scopes.pop();
        Ok(())
    }

    fn check_func(&mut self, f: &FuncDecl, class: Option<&str>) -> Result<()> {
        self.current_class = class.map(|c| c.to_string());
        self.current_ret = self.resolve_type(&f.ret, f.line)?;
        self.scopes.push(FxHashMap::default());
        for (ty, name) in &f.params {
            let ty = self.resolve_type(ty, f.line)?;
            if self
                .scopes
                .last_mut()
                .unwrap()
                .insert(name.clone(), ty)
                .is_some()
            {
                return Err(sem_err(f.line, format!("duplicate parameter '{}'", name)));
            }
        }
        self.check_stmts(&f.body)?;
        self.scopes.pop();

        let needs_return =
            self.current_ret != SemTy::Void && f.name != "main" && !self.in_ctor;
        if needs_return && !Self::returns_on_all_paths(&f.body) {
            return Err(sem_err(
                f.line,
                format!("function '{}' does not return on every path", f.name),
            ));
        }
        self.current_class = None;
        Ok(())
    }

    /// Conservative all-paths-return analysis, enough for the upstream
    /// contract that every return path is well-typed. A loop whose condition
    /// is literally `true` only falls through via `break`, so a `return`
    /// anywhere inside satisfies it.
    fn returns_on_all_paths(stmts: &[Stmt]) -> bool {
        stmts.iter().any(|s| match s {
            Stmt::Return(..) => true,
            Stmt::Block(inner) => Self::returns_on_all_paths(inner),
            Stmt::If {
                then,
                els: Some(els),
                ..
            } => Self::returns_on_all_paths(then) && Self::returns_on_all_paths(els),
            Stmt::While { cond, body } if matches!(cond.kind, ExprKind::Bool(true)) => {
                Self::contains_return(body)
            }
            Stmt::For {
                cond: None, body, ..
            } => Self::contains_return(body),
            _ => false,
        })
    }

    fn contains_return(stmts: &[Stmt]) -> bool {
        stmts.iter().any(|s| match s {
            Stmt::Return(..) => true,
            Stmt::Block(inner) => Self::contains_return(inner),
            Stmt::If { then, els, .. } => {
                Self::contains_return(then)
                    || els.as_deref().map(Self::contains_return).unwrap_or(false)
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => Self::contains_return(body),
            _ => false,
        })
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for s in stmts {
            self.check_stmt(s)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Decl(decl) => self.check_local_decl(decl),
            Stmt::Expr(None) => Ok(()),
            Stmt::Expr(Some(e)) => {
                self.check_expr(e)?;
                Ok(())
            }
            Stmt::If { cond, then, els } => {
                self.expect_bool(cond)?;
                self.in_scope(|c| c.check_stmts(then))?;
                if let Some(els) = els {
                    self.in_scope(|c| c.check_stmts(els))?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                self.expect_bool(cond)?;
                self.loop_depth += 1;
                let r = self.in_scope(|c| c.check_stmts(body));
                self.loop_depth -= 1;
                r
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.in_scope(|c| {
                if let Some(init) = init {
                    c.check_stmt(init)?;
                }
                if let Some(cond) = cond {
                    c.expect_bool(cond)?;
                }
                if let Some(step) = step {
                    c.check_expr(step)?;
                }
                c.loop_depth += 1;
                let r = c.in_scope(|c| c.check_stmts(body));
                c.loop_depth -= 1;
                r
            }),
            Stmt::Break(line) | Stmt::Continue(line) => {
                if self.loop_depth == 0 {
                    Err(sem_err(*line, "break/continue outside of a loop"))
                } else {
                    Ok(())
                }
            }
            Stmt::Return(value, line) => {
                let value_ty = match value {
                    Some(e) => self.check_expr(e)?,
                    None => SemTy::Void,
                };
                let expected = if self.in_ctor {
                    SemTy::Void
                } else {
                    self.current_ret.clone()
                };
                if !expected.accepts(&value_ty) && !(expected == SemTy::Void && value.is_none()) {
                    return Err(sem_err(
                        *line,
                        format!("return type mismatch: expected {}, found {}", expected, value_ty),
                    ));
                }
                Ok(())
            }
            Stmt::Block(inner) => self.in_scope(|c| c.check_stmts(inner)),
        }
    }

    fn check_local_decl(&mut self, decl: &VarDecl) -> Result<()> {
        let ty = self.resolve_type(&decl.ty, decl.line)?;
        if ty == SemTy::Void {
            return Err(sem_err(decl.line, "variable of type void"));
        }
        for (name, init) in &decl.vars {
            if let Some(init) = init {
                let init_ty = self.check_expr(init)?;
                if !ty.accepts(&init_ty) {
                    return Err(sem_err(
                        decl.line,
                        format!("cannot initialize {} with {}", ty, init_ty),
                    ));
                }
            }
            if self
                .scopes
                .last_mut()
                .unwrap()
                .insert(name.clone(), ty.clone())
                .is_some()
            {
                return Err(sem_err(
                    decl.line,
                    format!("duplicate variable '{}' in this scope", name),
                ));
            }
        }
        Ok(())
    }

    fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(FxHashMap::default());
        let r = f(self);
        self.scopes.pop();
        r
    }

    fn expect_bool(&mut self, e: &Expr) -> Result<()> {
        let ty = self.check_expr(e)?;
        if ty != SemTy::Bool {
            return Err(sem_err(e.line, format!("condition must be bool, found {}", ty)));
        }
        Ok(())
    }

    // --- expressions ---

    fn record(&mut self, e: &Expr, ty: SemTy) -> SemTy {
        self.out.types.insert(e.id, ty.clone());
        ty
    }

    fn check_expr(&mut self, e: &Expr) -> Result<SemTy> {
        let ty = match &e.kind {
            ExprKind::Int(_) => SemTy::Int,
            ExprKind::Str(_) => SemTy::Str,
            ExprKind::Bool(_) => SemTy::Bool,
            ExprKind::Null => SemTy::Null,
            ExprKind::This => match &self.current_class {
                Some(class) => SemTy::Class(class.clone()),
                None => return Err(sem_err(e.line, "'this' outside of a class")),
            },
            ExprKind::Ident(name) => match self.resolve_ident(name) {
                Some(ty) => ty,
                None => return Err(sem_err(e.line, format!("unknown identifier '{}'", name))),
            },
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.check_expr(operand)?;
                let (want, out) = match op {
                    UnOp::Neg | UnOp::BitNot => (SemTy::Int, SemTy::Int),
                    UnOp::Not => (SemTy::Bool, SemTy::Bool),
                };
                if operand_ty != want {
                    return Err(sem_err(
                        e.line,
                        format!("unary operator expects {}, found {}", want, operand_ty),
                    ));
                }
                out
            }
            ExprKind::PreIncDec { target, .. } | ExprKind::PostIncDec { target, .. } => {
                if !target.is_lvalue() {
                    return Err(sem_err(e.line, "'++'/'--' target is not an lvalue"));
                }
                let target_ty = self.check_expr(target)?;
                if target_ty != SemTy::Int {
                    return Err(sem_err(
                        e.line,
                        format!("'++'/'--' expects int, found {}", target_ty),
                    ));
                }
                SemTy::Int
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.check_expr(lhs)?;
                let r = self.check_expr(rhs)?;
                self.check_binop(*op, &l, &r, e.line)?
            }
            ExprKind::Assign { target, value } => {
                let target_ty = self.check_expr(target)?;
                let value_ty = self.check_expr(value)?;
                if !target_ty.accepts(&value_ty) {
                    return Err(sem_err(
                        e.line,
                        format!("cannot assign {} to {}", value_ty, target_ty),
                    ));
                }
                target_ty
            }
            ExprKind::Call { callee, args } => {
                // Inside a class, an unqualified call may target a sibling
                // method before any free function of the same name.
                let sig = self
                    .current_class
                    .as_ref()
                    .and_then(|c| self.out.classes.get(c))
                    .and_then(|info| info.methods.get(callee))
                    .or_else(|| self.out.funcs.get(callee))
                    .cloned()
                    .ok_or_else(|| sem_err(e.line, format!("unknown function '{}'", callee)))?;
                self.check_args(&sig, args, callee, e.line)?;
                sig.ret
            }
            ExprKind::MethodCall { recv, method, args } => {
                let recv_ty = self.check_expr(recv)?;
                match &recv_ty {
                    SemTy::Class(class) => {
                        let sig = self
                            .out
                            .classes
                            .get(class)
                            .and_then(|info| info.methods.get(method))
                            .cloned()
                            .ok_or_else(|| {
                                sem_err(
                                    e.line,
                                    format!("class '{}' has no method '{}'", class, method),
                                )
                            })?;
                        self.check_args(&sig, args, method, e.line)?;
                        sig.ret
                    }
                    SemTy::Str => self.check_string_builtin(method, args, e.line)?,
                    SemTy::Array(_) => {
                        if method == "size" && args.is_empty() {
                            SemTy::Int
                        } else {
                            return Err(sem_err(
                                e.line,
                                format!("array has no method '{}'", method),
                            ));
                        }
                    }
                    other => {
                        return Err(sem_err(
                            e.line,
                            format!("method call on non-object type {}", other),
                        ));
                    }
                }
            }
            ExprKind::Member { recv, field } => {
                let recv_ty = self.check_expr(recv)?;
                match &recv_ty {
                    SemTy::Class(class) => {
                        let info = self.out.classes.get(class).ok_or_else(|| {
                            sem_err(e.line, format!("unknown class '{}'", class))
                        })?;
                        match info.field(field) {
                            Some((_, ty)) => ty.clone(),
                            None => {
                                return Err(sem_err(
                                    e.line,
                                    format!("class '{}' has no field '{}'", class, field),
                                ));
                            }
                        }
                    }
                    other => {
                        return Err(sem_err(
                            e.line,
                            format!("field access on non-class type {}", other),
                        ));
                    }
                }
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.check_expr(base)?;
                let index_ty = self.check_expr(index)?;
                if index_ty != SemTy::Int {
                    return Err(sem_err(e.line, "array index must be int"));
                }
                match base_ty {
                    SemTy::Array(elem) => *elem,
                    other => {
                        return Err(sem_err(e.line, format!("cannot index type {}", other)));
                    }
                }
            }
            ExprKind::NewObject { class, args } => {
                let info = self
                    .out
                    .classes
                    .get(class)
                    .cloned()
                    .ok_or_else(|| sem_err(e.line, format!("unknown class '{}'", class)))?;
                if info.has_ctor {
                    let sig = info.methods.get(class.as_str()).cloned().ok_or_else(|| {
                        MxcError::Internal(format!("missing constructor signature for '{}'", class))
                    })?;
                    self.check_args(&sig, args, class, e.line)?;
                } else if !args.is_empty() {
                    return Err(sem_err(
                        e.line,
                        format!("class '{}' has no constructor taking arguments", class),
                    ));
                }
                SemTy::Class(class.clone())
            }
            ExprKind::NewArray { elem, dims } => {
                let elem = self.resolve_type(elem, e.line)?;
                if elem == SemTy::Void {
                    return Err(sem_err(e.line, "array of void"));
                }
                if dims.first().map(|d| d.is_none()).unwrap_or(true) {
                    return Err(sem_err(e.line, "first array dimension is required"));
                }
                for dim in dims.iter().flatten() {
                    let dim_ty = self.check_expr(dim)?;
                    if dim_ty != SemTy::Int {
                        return Err(sem_err(e.line, "array dimension must be int"));
                    }
                }
                let mut ty = elem;
                for _ in dims {
                    ty = SemTy::Array(Box::new(ty));
                }
                ty
            }
        };
        Ok(self.record(e, ty))
    }

    /// Unqualified identifier resolution: innermost scope, then enclosing
    /// class field, then global (the outermost scope already holds globals).
    fn resolve_ident(&self, name: &str) -> Option<SemTy> {
        for scope in self.scopes.iter().rev().take(self.scopes.len() - 1) {
            if let Some(ty) = scope.get(name) {
                return Some(ty.clone());
            }
        }
        if let Some(class) = &self.current_class {
            if let Some(info) = self.out.classes.get(class) {
                if let Some((_, ty)) = info.field(name) {
                    return Some(ty.clone());
                }
            }
        }
        self.scopes.first().and_then(|g| g.get(name).cloned())
    }

    fn check_args(&mut self, sig: &FuncSig, args: &[Expr], name: &str, line: u32) -> Result<()> {
        if sig.params.len() != args.len() {
            return Err(sem_err(
                line,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    name,
                    sig.params.len(),
                    args.len()
                ),
            ));
        }
        for (param, arg) in sig.params.iter().zip(args) {
            let arg_ty = self.check_expr(arg)?;
            if !param.accepts(&arg_ty) {
                return Err(sem_err(
                    arg.line,
                    format!("argument type mismatch: expected {}, found {}", param, arg_ty),
                ));
            }
        }
        Ok(())
    }

    fn check_string_builtin(&mut self, method: &str, args: &[Expr], line: u32) -> Result<SemTy> {
        let sig: (&[SemTy], SemTy) = match method {
            "length" => (&[], SemTy::Int),
            "substring" => (&[SemTy::Int, SemTy::Int], SemTy::Str),
            "parseInt" => (&[], SemTy::Int),
            "ord" => (&[SemTy::Int], SemTy::Int),
            other => {
                return Err(sem_err(line, format!("string has no method '{}'", other)));
            }
        };
        if sig.0.len() != args.len() {
            return Err(sem_err(
                line,
                format!("string.{} expects {} argument(s)", method, sig.0.len()),
            ));
        }
        for (param, arg) in sig.0.iter().zip(args) {
            let arg_ty = self.check_expr(arg)?;
            if arg_ty != *param {
                return Err(sem_err(arg.line, "argument type mismatch"));
            }
        }
        Ok(sig.1)
    }

    fn check_binop(&self, op: AstBinOp, l: &SemTy, r: &SemTy, line: u32) -> Result<SemTy> {
        use AstBinOp::*;
        let ty = match op {
            Mul | Div | Mod | Sub | Shl | Shr | BitAnd | BitXor | BitOr => {
                if l == &SemTy::Int && r == &SemTy::Int {
                    SemTy::Int
                } else {
                    return Err(sem_err(
                        line,
                        format!("operator expects int operands, found {} and {}", l, r),
                    ));
                }
            }
            Add => match (l, r) {
                (SemTy::Int, SemTy::Int) => SemTy::Int,
                (SemTy::Str, SemTy::Str) => SemTy::Str,
                _ => {
                    return Err(sem_err(
                        line,
                        format!("'+' expects two ints or two strings, found {} and {}", l, r),
                    ));
                }
            },
            Lt | Le | Gt | Ge => match (l, r) {
                (SemTy::Int, SemTy::Int) | (SemTy::Str, SemTy::Str) => SemTy::Bool,
                _ => {
                    return Err(sem_err(
                        line,
                        format!("comparison expects matching int or string operands, found {} and {}", l, r),
                    ));
                }
            },
            Eq | Ne => {
                let ok = l == r
                    || (l == &SemTy::Null && r.is_reference())
                    || (r == &SemTy::Null && l.is_reference());
                if !ok {
                    return Err(sem_err(
                        line,
                        format!("cannot compare {} with {}", l, r),
                    ));
                }
                SemTy::Bool
            }
            LogAnd | LogOr => {
                if l == &SemTy::Bool && r == &SemTy::Bool {
                    SemTy::Bool
                } else {
                    return Err(sem_err(line, "logical operator expects bool operands"));
                }
            }
        };
        Ok(ty)
    }
}
