//! AST → IR lowering.
//!
//! Every local variable and parameter becomes an `alloca` in the entry block;
//! reads are loads and writes are stores, so no on-the-fly SSA construction
//! is needed — Mem2Reg later promotes the cells that do not escape.
//!
//! Control flow lowers to explicit blocks: `if` to then/else/merge, loops to
//! header/body/step/exit with break/continue label stacks, short-circuit
//! `&&`/`||` to branches storing into a synthetic bool cell. Classes lower to
//! free functions named `Class.method` with `this` as parameter zero; `new`
//! arrays become inline length-prefixed heap allocations; string operations
//! become runtime calls; non-constant global initializers are hoisted into a
//! synthetic `__init` called first in `main`.

use rustc_hash::FxHashMap;

use crate::error::{MxcError, Result};
use crate::frontend::ast::*;
use crate::frontend::{Checked, SemTy};

use super::function::{Block, Function, Param};
use super::instruction::{BinOp, CmpOp, Inst};
use super::module::{ClassLayout, GlobalVar, Module};
use super::types::{SlotKind, Ty, VReg, Value};

/// Name of the synthetic global-initializer function.
pub const INIT_FUNC: &str = "__init";

/// Lower a checked program into an IR module.
pub fn build_module(program: &Program, checked: &Checked) -> Result<Module> {
    let mut module = Module::new();

    // Class layouts first: object sizes are needed by every `new`.
    for item in &program.items {
        if let Item::Class(c) = item {
            let mut layout = ClassLayout::new(c.name.clone());
            for decl in &c.fields {
                for (name, _) in &decl.vars {
                    layout.fields.push(name.clone());
                }
            }
            module.classes.insert(c.name.clone(), layout);
        }
    }

    let has_init = build_globals(program, checked, &mut module)?;

    for item in &program.items {
        match item {
            Item::Func(f) => {
                let func = FuncLowering::new(checked, &mut module, None).lower(f, has_init)?;
                module.add_function(func);
            }
            Item::Class(c) => {
                for m in &c.methods {
                    let func =
                        FuncLowering::new(checked, &mut module, Some(&c.name)).lower(m, false)?;
                    module.add_function(func);
                }
                if let Some(ctor) = &c.ctor {
                    let func =
                        FuncLowering::new(checked, &mut module, Some(&c.name)).lower(ctor, false)?;
                    module.add_function(func);
                }
            }
            Item::Global(_) => {}
        }
    }

    Ok(module)
}

/// Emit global variables and, when any initializer is not a pure constant,
/// the synthetic `__init` function storing them. Returns whether `__init`
/// was emitted.
fn build_globals(program: &Program, checked: &Checked, module: &mut Module) -> Result<bool> {
    let mut dynamic: Vec<(String, &Expr)> = Vec::new();
    for item in &program.items {
        if let Item::Global(decl) = item {
            for (name, init) in &decl.vars {
                let const_init = match init {
                    Some(Expr {
                        kind: ExprKind::Int(v),
                        ..
                    }) => Some(*v),
                    Some(Expr {
                        kind: ExprKind::Bool(b),
                        ..
                    }) => Some(*b as i32),
                    Some(e) => {
                        dynamic.push((name.clone(), e));
                        None
                    }
                    None => Some(0),
                };
                module.globals.push(GlobalVar {
                    name: name.clone(),
                    init: const_init.unwrap_or(0),
                });
            }
        }
    }

    if dynamic.is_empty() {
        return Ok(false);
    }

    let mut lowering = FuncLowering::new(checked, module, None);
    lowering.func = Function::new(INIT_FUNC, Ty::Void);
    lowering.func.add_block(Block::new("entry"));
    lowering.cur = "entry".to_string();
    lowering.scopes.push(FxHashMap::default());
    for (name, init) in dynamic {
        let value = lowering.lower_expr(init)?;
        lowering.emit(Inst::Store {
            ty: lowering.value_ir_ty(init),
            value,
            ptr: Value::Global(name),
        });
    }
    lowering.emit(Inst::Ret { value: None });
    let func = lowering.func;
    module.add_function(func);
    Ok(true)
}

/// Per-function lowering state.
struct FuncLowering<'a> {
    checked: &'a Checked,
    module: &'a mut Module,
    class: Option<String>,
    func: Function,
    /// Label of the block instructions are currently appended to.
    cur: String,
    /// Lexical scopes mapping a variable name to its alloca pointer register.
    scopes: Vec<FxHashMap<String, VReg>>,
    /// (continue target, break target) for each enclosing loop.
    loops: Vec<(String, String)>,
    /// Number of allocas already placed at the head of the entry block.
    entry_allocas: usize,
    label_counter: u32,
}

impl<'a> FuncLowering<'a> {
    fn new(checked: &'a Checked, module: &'a mut Module, class: Option<&str>) -> Self {
        Self {
            checked,
            module,
            class: class.map(|c| c.to_string()),
            func: Function::new("", Ty::Void),
            cur: String::new(),
            scopes: Vec::new(),
            loops: Vec::new(),
            entry_allocas: 0,
            label_counter: 0,
        }
    }

    fn lower(mut self, decl: &FuncDecl, call_init: bool) -> Result<Function> {
        let name = match &self.class {
            Some(class) => format!("{}.{}", class, decl.name),
            None => decl.name.clone(),
        };
        let ret_ty = if self.class.is_some() && decl.name == self.class.clone().unwrap_or_default()
        {
            Ty::Void // constructor
        } else {
            sem_to_ir(&self.type_node_sem(&decl.ret))
        };
        self.func = Function::new(name, ret_ty);
        self.func.add_block(Block::new("entry"));
        self.cur = "entry".to_string();
        self.scopes.push(FxHashMap::default());

        if self.class.is_some() {
            let this = self.func.vregs.alloc(Ty::Ptr);
            self.func.params.push(Param {
                name: "this".into(),
                reg: this,
                ty: Ty::Ptr,
            });
            let cell = self.alloca(Ty::Ptr);
            self.emit(Inst::Store {
                ty: Ty::Ptr,
                value: Value::Reg(this),
                ptr: Value::Reg(cell),
            });
            self.scopes.last_mut().unwrap().insert("this".into(), cell);
        }
        for (ty_node, pname) in &decl.params {
            let ty = sem_to_ir(&self.type_node_sem(ty_node));
            let reg = self.func.vregs.alloc(ty);
            self.func.params.push(Param {
                name: pname.clone(),
                reg,
                ty,
            });
            let cell = self.alloca(ty);
            self.emit(Inst::Store {
                ty,
                value: Value::Reg(reg),
                ptr: Value::Reg(cell),
            });
            self.scopes.last_mut().unwrap().insert(pname.clone(), cell);
        }

        if call_init && decl.name == "main" {
            self.emit(Inst::Call {
                result: None,
                func: INIT_FUNC.into(),
                args: Vec::new(),
            });
        }

        self.lower_stmts(&decl.body)?;

        // Terminate any fall-through or dead block with a default return.
        let default_ret = match self.func.ret_ty {
            Ty::Void => Inst::Ret { value: None },
            _ => Inst::Ret {
                value: Some(Value::Int(0)),
            },
        };
        for block in &mut self.func.blocks {
            if !block.has_terminator() {
                block.push(default_ret.clone());
            }
        }

        Ok(self.func)
    }

    // --- plumbing ---

    fn fresh_label(&mut self, prefix: &str) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!("{}.{}", prefix, n)
    }

    fn new_block(&mut self, label: String) {
        self.func.add_block(Block::new(label.clone()));
        self.cur = label;
    }

    /// Append to the current block, diverting into a fresh unreachable block
    /// if the current one is already terminated (code after break/return).
    fn emit(&mut self, inst: Inst) {
        let terminated = self
            .func
            .get_block(&self.cur)
            .map(|b| b.has_terminator())
            .unwrap_or(false);
        if terminated {
            let dead = self.fresh_label("dead");
            self.new_block(dead);
        }
        self.func
            .get_block_mut(&self.cur.clone())
            .expect("current block exists")
            .push(inst);
    }

    fn cur_terminated(&self) -> bool {
        self.func
            .get_block(&self.cur)
            .map(|b| b.has_terminator())
            .unwrap_or(false)
    }

    /// Reserve a stack cell in the entry block and return its address
    /// register.
    fn alloca(&mut self, ty: Ty) -> VReg {
        let result = self.func.vregs.alloc(Ty::Ptr);
        let slot = self.func.slots.alloc(SlotKind::Local);
        let entry = self.func.get_block_mut("entry").expect("entry exists");
        entry.insts.insert(
            self.entry_allocas,
            Inst::Alloca { result, ty, slot },
        );
        self.entry_allocas += 1;
        result
    }

    fn vreg(&mut self, ty: Ty) -> VReg {
        self.func.vregs.alloc(ty)
    }

    fn expr_sem(&self, e: &Expr) -> SemTy {
        self.checked
            .types
            .get(&e.id)
            .cloned()
            .unwrap_or(SemTy::Void)
    }

    fn value_ir_ty(&self, e: &Expr) -> Ty {
        sem_to_ir(&self.expr_sem(e))
    }

    fn type_node_sem(&self, ty: &TypeNode) -> SemTy {
        match ty {
            TypeNode::Int => SemTy::Int,
            TypeNode::Bool => SemTy::Bool,
            TypeNode::Str => SemTy::Str,
            TypeNode::Void => SemTy::Void,
            TypeNode::Class(name) => SemTy::Class(name.clone()),
            TypeNode::Array(elem) => SemTy::Array(Box::new(self.type_node_sem(elem))),
        }
    }

    fn unsupported(&self, line: u32, what: &str) -> MxcError {
        MxcError::Internal(format!(
            "line {}: cannot lower {} in '{}'",
            line, what, self.func.name
        ))
    }

    // --- statements ---

    fn lower_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for s in stmts {
            self.lower_stmt(s)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Decl(decl) => {
                let ty = sem_to_ir(&self.type_node_sem(&decl.ty));
                for (name, init) in &decl.vars {
                    let cell = self.alloca(ty);
                    if let Some(init) = init {
                        let value = self.lower_expr(init)?;
                        self.emit(Inst::Store {
                            ty,
                            value,
                            ptr: Value::Reg(cell),
                        });
                    }
                    self.scopes.last_mut().unwrap().insert(name.clone(), cell);
                }
                Ok(())
            }
            Stmt::Expr(None) => Ok(()),
            Stmt::Expr(Some(e)) => {
                self.lower_expr(e)?;
                Ok(())
            }
            Stmt::If { cond, then, els } => {
                let then_l = self.fresh_label("if_then");
                let else_l = self.fresh_label("if_else");
                let merge_l = self.fresh_label("if_merge");
                let cond_v = self.lower_expr(cond)?;
                self.emit(Inst::Br {
                    cond: cond_v,
                    true_label: then_l.clone(),
                    false_label: if els.is_some() {
                        else_l.clone()
                    } else {
                        merge_l.clone()
                    },
                });

                self.new_block(then_l);
                self.in_scope(|s| s.lower_stmts(then))?;
                if !self.cur_terminated() {
                    self.emit(Inst::Jmp {
                        target: merge_l.clone(),
                    });
                }

                if let Some(els) = els {
                    self.new_block(else_l);
                    self.in_scope(|s| s.lower_stmts(els))?;
                    if !self.cur_terminated() {
                        self.emit(Inst::Jmp {
                            target: merge_l.clone(),
                        });
                    }
                }

                self.new_block(merge_l);
                Ok(())
            }
            Stmt::While { cond, body } => {
                let header_l = self.fresh_label("while_header");
                let body_l = self.fresh_label("while_body");
                let exit_l = self.fresh_label("while_exit");

                self.emit(Inst::Jmp {
                    target: header_l.clone(),
                });
                self.new_block(header_l.clone());
                let cond_v = self.lower_expr(cond)?;
                self.emit(Inst::Br {
                    cond: cond_v,
                    true_label: body_l.clone(),
                    false_label: exit_l.clone(),
                });

                self.new_block(body_l);
                self.loops.push((header_l.clone(), exit_l.clone()));
                let r = self.in_scope(|s| s.lower_stmts(body));
                self.loops.pop();
                r?;
                if !self.cur_terminated() {
                    self.emit(Inst::Jmp { target: header_l });
                }

                self.new_block(exit_l);
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.in_scope(|s| {
                let header_l = s.fresh_label("for_header");
                let body_l = s.fresh_label("for_body");
                let step_l = s.fresh_label("for_step");
                let exit_l = s.fresh_label("for_exit");

                if let Some(init) = init {
                    s.lower_stmt(init)?;
                }
                s.emit(Inst::Jmp {
                    target: header_l.clone(),
                });
                s.new_block(header_l.clone());
                let cond_v = match cond {
                    Some(cond) => s.lower_expr(cond)?,
                    None => Value::Bool(true),
                };
                s.emit(Inst::Br {
                    cond: cond_v,
                    true_label: body_l.clone(),
                    false_label: exit_l.clone(),
                });

                s.new_block(body_l);
                s.loops.push((step_l.clone(), exit_l.clone()));
                let r = s.in_scope(|s| s.lower_stmts(body));
                s.loops.pop();
                r?;
                if !s.cur_terminated() {
                    s.emit(Inst::Jmp {
                        target: step_l.clone(),
                    });
                }

                s.new_block(step_l);
                if let Some(step) = step {
                    s.lower_expr(step)?;
                }
                s.emit(Inst::Jmp { target: header_l });

                s.new_block(exit_l);
                Ok(())
            }),
            Stmt::Break(line) => {
                let target = self
                    .loops
                    .last()
                    .map(|(_, brk)| brk.clone())
                    .ok_or_else(|| self.unsupported(*line, "break outside loop"))?;
                self.emit(Inst::Jmp { target });
                Ok(())
            }
            Stmt::Continue(line) => {
                let target = self
                    .loops
                    .last()
                    .map(|(cont, _)| cont.clone())
                    .ok_or_else(|| self.unsupported(*line, "continue outside loop"))?;
                self.emit(Inst::Jmp { target });
                Ok(())
            }
            Stmt::Return(value, _) => {
                let value = match value {
                    Some(e) => Some(self.lower_expr(e)?),
                    None => None,
                };
                let value = match (self.func.ret_ty, value) {
                    (Ty::Void, _) => None,
                    (_, v) => v,
                };
                self.emit(Inst::Ret { value });
                Ok(())
            }
            Stmt::Block(inner) => self.in_scope(|s| s.lower_stmts(inner)),
        }
    }

    fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(FxHashMap::default());
        let r = f(self);
        self.scopes.pop();
        r
    }

    // --- places (addresses of lvalues) ---

    fn lower_place(&mut self, e: &Expr) -> Result<Value> {
        match &e.kind {
            ExprKind::Ident(name) => self.resolve_place(name, e.line),
            ExprKind::Member { recv, field } => {
                let base = self.lower_expr(recv)?;
                let class = match self.expr_sem(recv) {
                    SemTy::Class(c) => c,
                    other => {
                        return Err(self.unsupported(e.line, &format!("field access on {}", other)))
                    }
                };
                let field_index = self
                    .module
                    .classes
                    .get(&class)
                    .and_then(|l| l.field_index(field))
                    .ok_or_else(|| self.unsupported(e.line, "unknown field"))?;
                let result = self.vreg(Ty::Ptr);
                self.emit(Inst::GetFieldPtr {
                    result,
                    base,
                    field_index,
                });
                Ok(Value::Reg(result))
            }
            ExprKind::Index { base, index } => {
                let base_v = self.lower_expr(base)?;
                let index_v = self.lower_expr(index)?;
                let result = self.vreg(Ty::Ptr);
                self.emit(Inst::GetElemPtr {
                    result,
                    base: base_v,
                    index: index_v,
                });
                Ok(Value::Reg(result))
            }
            _ => Err(self.unsupported(e.line, "non-lvalue assignment target")),
        }
    }

    /// Resolve an unqualified name to the address of its storage: local
    /// cell, field of the enclosing class, or global.
    fn resolve_place(&mut self, name: &str, line: u32) -> Result<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(cell) = scope.get(name) {
                return Ok(Value::Reg(*cell));
            }
        }
        if let Some(class) = self.class.clone() {
            if let Some(field_index) = self
                .module
                .classes
                .get(&class)
                .and_then(|l| l.field_index(name))
            {
                let this = self.load_this(line)?;
                let result = self.vreg(Ty::Ptr);
                self.emit(Inst::GetFieldPtr {
                    result,
                    base: this,
                    field_index,
                });
                return Ok(Value::Reg(result));
            }
        }
        if self.module.globals.iter().any(|g| g.name == name) {
            return Ok(Value::Global(name.to_string()));
        }
        Err(self.unsupported(line, &format!("unresolved identifier '{}'", name)))
    }

    fn load_this(&mut self, line: u32) -> Result<Value> {
        let cell = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.get("this"))
            .copied()
            .ok_or_else(|| self.unsupported(line, "'this' outside method"))?;
        let result = self.vreg(Ty::Ptr);
        self.emit(Inst::Load {
            result,
            ty: Ty::Ptr,
            ptr: Value::Reg(cell),
        });
        Ok(Value::Reg(result))
    }

    // --- expressions ---

    fn lower_expr(&mut self, e: &Expr) -> Result<Value> {
        match &e.kind {
            ExprKind::Int(v) => Ok(Value::Int(*v)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Str(s) => {
                let idx = self.module.intern_string(s);
                Ok(Value::Str(idx))
            }
            ExprKind::This => self.load_this(e.line),
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let ty = self.value_ir_ty(e);
                let ptr = self.lower_place(e)?;
                let result = self.vreg(ty);
                self.emit(Inst::Load { result, ty, ptr });
                Ok(Value::Reg(result))
            }
            ExprKind::Unary { op, operand } => {
                let v = self.lower_expr(operand)?;
                let (bin, lhs, rhs) = match op {
                    UnOp::Neg => (BinOp::Sub, Value::Int(0), v),
                    UnOp::Not => (BinOp::Xor, v, Value::Int(1)),
                    UnOp::BitNot => (BinOp::Xor, v, Value::Int(-1)),
                };
                let result = self.vreg(Ty::I32);
                self.emit(Inst::Binary {
                    op: bin,
                    result,
                    lhs,
                    rhs,
                });
                Ok(Value::Reg(result))
            }
            ExprKind::PreIncDec { inc, target } | ExprKind::PostIncDec { inc, target } => {
                let is_pre = matches!(e.kind, ExprKind::PreIncDec { .. });
                let ptr = self.lower_place(target)?;
                let old = self.vreg(Ty::I32);
                self.emit(Inst::Load {
                    result: old,
                    ty: Ty::I32,
                    ptr: ptr.clone(),
                });
                let new = self.vreg(Ty::I32);
                self.emit(Inst::Binary {
                    op: if *inc { BinOp::Add } else { BinOp::Sub },
                    result: new,
                    lhs: Value::Reg(old),
                    rhs: Value::Int(1),
                });
                self.emit(Inst::Store {
                    ty: Ty::I32,
                    value: Value::Reg(new),
                    ptr,
                });
                Ok(Value::Reg(if is_pre { new } else { old }))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(e, *op, lhs, rhs),
            ExprKind::Assign { target, value } => {
                let v = self.lower_expr(value)?;
                let ty = self.value_ir_ty(target);
                let ptr = self.lower_place(target)?;
                self.emit(Inst::Store {
                    ty,
                    value: v.clone(),
                    ptr,
                });
                Ok(v)
            }
            ExprKind::Call { callee, args } => {
                // Sibling method of the enclosing class takes priority.
                let class_method = self.class.clone().filter(|class| {
                    self.checked
                        .classes
                        .get(class)
                        .map(|info| info.methods.contains_key(callee))
                        .unwrap_or(false)
                });
                let (name, mut call_args) = match class_method {
                    Some(class) => (format!("{}.{}", class, callee), vec![self.load_this(e.line)?]),
                    None => (callee.clone(), Vec::new()),
                };
                for a in args {
                    let v = self.lower_expr(a)?;
                    call_args.push(v);
                }
                self.emit_call(e, name, call_args)
            }
            ExprKind::MethodCall { recv, method, args } => {
                let recv_sem = self.expr_sem(recv);
                match recv_sem {
                    SemTy::Array(_) if method == "size" => {
                        let base = self.lower_expr(recv)?;
                        let len_ptr = self.vreg(Ty::Ptr);
                        self.emit(Inst::GetElemPtr {
                            result: len_ptr,
                            base,
                            index: Value::Int(-1),
                        });
                        let result = self.vreg(Ty::I32);
                        self.emit(Inst::Load {
                            result,
                            ty: Ty::I32,
                            ptr: Value::Reg(len_ptr),
                        });
                        Ok(Value::Reg(result))
                    }
                    SemTy::Str => {
                        let mut call_args = vec![self.lower_expr(recv)?];
                        for a in args {
                            let v = self.lower_expr(a)?;
                            call_args.push(v);
                        }
                        self.emit_call(e, format!("string.{}", method), call_args)
                    }
                    SemTy::Class(class) => {
                        let mut call_args = vec![self.lower_expr(recv)?];
                        for a in args {
                            let v = self.lower_expr(a)?;
                            call_args.push(v);
                        }
                        self.emit_call(e, format!("{}.{}", class, method), call_args)
                    }
                    other => Err(self.unsupported(e.line, &format!("method call on {}", other))),
                }
            }
            ExprKind::NewObject { class, args } => {
                let size = self
                    .module
                    .classes
                    .get(class)
                    .map(|l| l.size())
                    .ok_or_else(|| self.unsupported(e.line, "unknown class"))?;
                let obj = self.vreg(Ty::Ptr);
                self.emit(Inst::Call {
                    result: Some(obj),
                    func: "malloc".into(),
                    args: vec![Value::Int(size.max(4) as i32)],
                });
                let has_ctor = self
                    .checked
                    .classes
                    .get(class)
                    .map(|info| info.has_ctor)
                    .unwrap_or(false);
                if has_ctor {
                    let mut call_args = vec![Value::Reg(obj)];
                    for a in args {
                        let v = self.lower_expr(a)?;
                        call_args.push(v);
                    }
                    self.emit(Inst::Call {
                        result: None,
                        func: format!("{}.{}", class, class),
                        args: call_args,
                    });
                }
                Ok(Value::Reg(obj))
            }
            ExprKind::NewArray { dims, .. } => {
                let mut dim_values = Vec::new();
                for dim in dims.iter().flatten() {
                    dim_values.push(self.lower_expr(dim)?);
                }
                self.emit_new_array(&dim_values)
            }
        }
    }

    fn emit_call(&mut self, e: &Expr, func: String, args: Vec<Value>) -> Result<Value> {
        let ret_sem = self.expr_sem(e);
        if ret_sem == SemTy::Void {
            self.emit(Inst::Call {
                result: None,
                func,
                args,
            });
            // A void call has no value; `Null` is a placeholder that checked
            // programs never consume.
            Ok(Value::Null)
        } else {
            let result = self.vreg(sem_to_ir(&ret_sem));
            self.emit(Inst::Call {
                result: Some(result),
                func,
                args,
            });
            Ok(Value::Reg(result))
        }
    }

    fn lower_binary(&mut self, e: &Expr, op: AstBinOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        use AstBinOp::*;

        // Short-circuit forms first: they control evaluation of `rhs`.
        if matches!(op, LogAnd | LogOr) {
            return self.lower_short_circuit(op == LogAnd, lhs, rhs);
        }

        let lhs_sem = self.expr_sem(lhs);
        let rhs_sem = self.expr_sem(rhs);
        let l = self.lower_expr(lhs)?;
        let r = self.lower_expr(rhs)?;

        // String runtime calls need two real strings; `s == null` and its
        // mirror compare pointers below instead.
        if lhs_sem == SemTy::Str && rhs_sem == SemTy::Str {
            let runtime = match op {
                Add => "string.add",
                Eq => "string.eq",
                Ne => "string.ne",
                Lt => "string.lt",
                Le => "string.le",
                Gt => "string.gt",
                Ge => "string.ge",
                _ => return Err(self.unsupported(e.line, "string operator")),
            };
            return self.emit_call(e, runtime.to_string(), vec![l, r]);
        }

        let bin = match op {
            Mul => Some(BinOp::Mul),
            Div => Some(BinOp::Sdiv),
            Mod => Some(BinOp::Srem),
            Add => Some(BinOp::Add),
            Sub => Some(BinOp::Sub),
            Shl => Some(BinOp::Shl),
            Shr => Some(BinOp::Ashr),
            BitAnd => Some(BinOp::And),
            BitXor => Some(BinOp::Xor),
            BitOr => Some(BinOp::Or),
            _ => None,
        };
        if let Some(bin) = bin {
            let result = self.vreg(Ty::I32);
            self.emit(Inst::Binary {
                op: bin,
                result,
                lhs: l,
                rhs: r,
            });
            return Ok(Value::Reg(result));
        }

        let cmp = match op {
            Eq => CmpOp::Eq,
            Ne => CmpOp::Ne,
            Lt => CmpOp::Lt,
            Le => CmpOp::Le,
            Gt => CmpOp::Gt,
            Ge => CmpOp::Ge,
            _ => return Err(self.unsupported(e.line, "binary operator")),
        };
        let result = self.vreg(Ty::I1);
        self.emit(Inst::Cmp {
            op: cmp,
            result,
            lhs: l,
            rhs: r,
        });
        Ok(Value::Reg(result))
    }

    /// `a && b` / `a || b` lowered to control flow storing into a synthetic
    /// bool cell whose final load yields the expression value.
    fn lower_short_circuit(&mut self, is_and: bool, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        let cell = self.alloca(Ty::I32);
        let rhs_l = self.fresh_label(if is_and { "land_rhs" } else { "lor_rhs" });
        let end_l = self.fresh_label(if is_and { "land_end" } else { "lor_end" });

        let l = self.lower_expr(lhs)?;
        self.emit(Inst::Store {
            ty: Ty::I32,
            value: l.clone(),
            ptr: Value::Reg(cell),
        });
        let (true_label, false_label) = if is_and {
            (rhs_l.clone(), end_l.clone())
        } else {
            (end_l.clone(), rhs_l.clone())
        };
        self.emit(Inst::Br {
            cond: l,
            true_label,
            false_label,
        });

        self.new_block(rhs_l);
        let r = self.lower_expr(rhs)?;
        self.emit(Inst::Store {
            ty: Ty::I32,
            value: r,
            ptr: Value::Reg(cell),
        });
        self.emit(Inst::Jmp {
            target: end_l.clone(),
        });

        self.new_block(end_l);
        let result = self.vreg(Ty::I1);
        self.emit(Inst::Load {
            result,
            ty: Ty::I32,
            ptr: Value::Reg(cell),
        });
        Ok(Value::Reg(result))
    }

    /// Allocate one array level: `malloc(4*len + 4)`, store the length at
    /// offset -4, return the pointer to the first element.
    fn emit_array_level(&mut self, len: Value) -> VReg {
        let bytes0 = self.vreg(Ty::I32);
        self.emit(Inst::Binary {
            op: BinOp::Mul,
            result: bytes0,
            lhs: len.clone(),
            rhs: Value::Int(4),
        });
        let bytes = self.vreg(Ty::I32);
        self.emit(Inst::Binary {
            op: BinOp::Add,
            result: bytes,
            lhs: Value::Reg(bytes0),
            rhs: Value::Int(4),
        });
        let raw = self.vreg(Ty::Ptr);
        self.emit(Inst::Call {
            result: Some(raw),
            func: "malloc".into(),
            args: vec![Value::Reg(bytes)],
        });
        self.emit(Inst::Store {
            ty: Ty::I32,
            value: len,
            ptr: Value::Reg(raw),
        });
        let data = self.vreg(Ty::Ptr);
        self.emit(Inst::GetElemPtr {
            result: data,
            base: Value::Reg(raw),
            index: Value::Int(1),
        });
        data
    }

    /// `new T[d0][d1]..`: allocate the outer level, then fill each element
    /// with a recursively allocated inner array via a generated loop.
    fn emit_new_array(&mut self, dims: &[Value]) -> Result<Value> {
        let data = self.emit_array_level(dims[0].clone());
        if dims.len() == 1 {
            return Ok(Value::Reg(data));
        }

        let idx_cell = self.alloca(Ty::I32);
        self.emit(Inst::Store {
            ty: Ty::I32,
            value: Value::Int(0),
            ptr: Value::Reg(idx_cell),
        });
        let header_l = self.fresh_label("newarr_header");
        let body_l = self.fresh_label("newarr_body");
        let exit_l = self.fresh_label("newarr_exit");
        self.emit(Inst::Jmp {
            target: header_l.clone(),
        });

        self.new_block(header_l.clone());
        let idx = self.vreg(Ty::I32);
        self.emit(Inst::Load {
            result: idx,
            ty: Ty::I32,
            ptr: Value::Reg(idx_cell),
        });
        let cond = self.vreg(Ty::I1);
        self.emit(Inst::Cmp {
            op: CmpOp::Lt,
            result: cond,
            lhs: Value::Reg(idx),
            rhs: dims[0].clone(),
        });
        self.emit(Inst::Br {
            cond: Value::Reg(cond),
            true_label: body_l.clone(),
            false_label: exit_l.clone(),
        });

        self.new_block(body_l);
        let inner = self.emit_new_array(&dims[1..])?;
        let elem_ptr = self.vreg(Ty::Ptr);
        self.emit(Inst::GetElemPtr {
            result: elem_ptr,
            base: Value::Reg(data),
            index: Value::Reg(idx),
        });
        self.emit(Inst::Store {
            ty: Ty::Ptr,
            value: inner,
            ptr: Value::Reg(elem_ptr),
        });
        let next = self.vreg(Ty::I32);
        self.emit(Inst::Binary {
            op: BinOp::Add,
            result: next,
            lhs: Value::Reg(idx),
            rhs: Value::Int(1),
        });
        self.emit(Inst::Store {
            ty: Ty::I32,
            value: Value::Reg(next),
            ptr: Value::Reg(idx_cell),
        });
        self.emit(Inst::Jmp { target: header_l });

        self.new_block(exit_l);
        Ok(Value::Reg(data))
    }
}

fn sem_to_ir(sem: &SemTy) -> Ty {
    match sem {
        SemTy::Int | SemTy::Bool => Ty::I32,
        SemTy::Str | SemTy::Class(_) | SemTy::Array(_) | SemTy::Null => Ty::Ptr,
        SemTy::Void => Ty::Void,
    }
}
