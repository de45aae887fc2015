//! Single-pass Pratt compiler: parses tokens and emits bytecode directly.
//!
//! There is no AST. Each token kind maps to a rule — an optional prefix
//! handler, an optional infix handler, and an infix precedence — and
//! [`Compiler::parse_precedence`] drives them, emitting into the current
//! function's [`Block`] as it goes. Statements are compiled by dedicated
//! methods; jumps are emitted with placeholder operands and patched once
//! their target offset is known.
//!
//! Parse errors are sticky: the first error in a statement records a
//! diagnostic and flips panic mode, `synchronize` skips to the next
//! statement boundary, and compilation continues so a single run reports
//! as many problems as possible. Any recorded diagnostic rejects the
//! script as a whole. Lexer errors are fatal and abort immediately.

use crate::builtins;
use crate::bytecode::{Block, Op};
use crate::error::{CompileErrors, Diagnostic, Error, Result};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::table::Table;
use crate::value::{Function, Heap, Obj, ObjRef, StructTemplate, Value};

/// Upper bound on local slots per function; indices fit in one byte.
const MAX_LOCALS: usize = 256;

/// Compile a whole source buffer as the body of a fresh arity-0 function.
///
/// Returns the script function on success, or every diagnostic the parse
/// collected — a script that produced any error yields no program.
pub fn compile(source: &str, name: &str, heap: &mut Heap) -> Result<ObjRef> {
    let mut compiler = Compiler::new(source, heap)?;
    while !compiler.check(TokenKind::Eof) {
        compiler.declaration()?;
    }
    compiler.finish(name)
}

/// Binding strength, weakest first. Infix parsing continues while the
/// next operator's precedence is at least the minimum being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    /// `=`
    Assignment,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==` `!=`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    /// `+` `-`
    Term,
    /// `*` `/`
    Factor,
    /// `!` unary `-`
    Unary,
    /// `()` `.` `:`
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter; used for left-associative infix operands.
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

type ParseFn<'src, 'h> = fn(&mut Compiler<'src, 'h>, bool) -> Result<()>;

/// One row of the Pratt table.
struct ParseRule<'src, 'h> {
    prefix: Option<ParseFn<'src, 'h>>,
    infix: Option<ParseFn<'src, 'h>>,
    precedence: Precedence,
}

/// A declared local: its name (borrowed from the source) and the scope
/// depth it was declared at. Slot index is its position in the table.
struct Local<'src> {
    name: &'src str,
    depth: usize,
}

/// Per-function compilation state. Nested function declarations swap in a
/// fresh context and restore the enclosing one when the body is done.
struct FuncCtx<'src> {
    block: Block,
    locals: Vec<Local<'src>>,
    scope_depth: usize,
    arity: u8,
}

impl<'src> FuncCtx<'src> {
    fn script() -> Self {
        FuncCtx {
            block: Block::new(),
            locals: Vec::new(),
            scope_depth: 0,
            arity: 0,
        }
    }

    /// Context for a function body: parameters and body locals live at
    /// depth 1, so nothing in it ever resolves as a global declaration.
    fn function() -> Self {
        FuncCtx {
            block: Block::new(),
            locals: Vec::new(),
            scope_depth: 1,
            arity: 0,
        }
    }
}

struct Compiler<'src, 'h> {
    lexer: Lexer<'src>,
    heap: &'h mut Heap,
    previous: Token<'src>,
    current: Token<'src>,
    ctx: FuncCtx<'src>,
    /// Names known to be globals; values are presence placeholders.
    globals: Table,
    diagnostics: Vec<Diagnostic>,
    panic_mode: bool,
    /// Set when the expression just compiled ended in an assignment,
    /// whose store opcodes already consume the value — the enclosing
    /// expression statement must not emit a `POP`.
    wrote_assignment: bool,
}

impl<'src, 'h> Compiler<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap) -> Result<Self> {
        let mut globals = Table::new();
        for name in builtins::NAMES {
            globals.set(name, Value::Null);
        }
        let mut compiler = Compiler {
            lexer: Lexer::new(source),
            heap,
            previous: Token::sentinel(),
            current: Token::sentinel(),
            ctx: FuncCtx::script(),
            globals,
            diagnostics: Vec::new(),
            panic_mode: false,
            wrote_assignment: false,
        };
        compiler.advance()?;
        Ok(compiler)
    }

    fn finish(mut self, name: &str) -> Result<ObjRef> {
        self.emit_op(Op::Return);
        if !self.diagnostics.is_empty() {
            return Err(Error::Compile(CompileErrors(self.diagnostics)));
        }
        let name_ref = self.heap.intern(name);
        Ok(self.heap.alloc(Obj::Function(Function {
            name: name_ref,
            arity: 0,
            block: self.ctx.block,
        })))
    }

    // -----------------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------------

    fn advance(&mut self) -> Result<()> {
        self.previous = self.current;
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> Result<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<()> {
        if self.check(kind) {
            self.advance()
        } else {
            self.error_at_current(message);
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Error reporting & recovery
    // -----------------------------------------------------------------------

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.diagnostics.push(Diagnostic {
            line: token.line,
            lexeme: if token.kind == TokenKind::Eof {
                String::new()
            } else {
                token.lexeme.to_string()
            },
            message: message.to_string(),
        });
    }

    /// Skip tokens until a likely statement boundary: just past a `;`, or
    /// just before a statement-starting keyword.
    fn synchronize(&mut self) -> Result<()> {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return Ok(());
            }
            match self.current.kind {
                TokenKind::Print
                | TokenKind::Exit
                | TokenKind::Return
                | TokenKind::Let
                | TokenKind::Fun
                | TokenKind::Struct
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::LBrace => return Ok(()),
                _ => {}
            }
            self.advance()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------------

    fn emit_op(&mut self, op: Op) {
        self.ctx.block.write_op(op);
    }

    fn emit_op_byte(&mut self, op: Op, operand: u8) {
        self.ctx.block.write_op_byte(op, operand);
    }

    fn emit_constant(&mut self, value: Value) {
        match self.ctx.block.add_constant(value) {
            Some(index) => self.emit_op_byte(Op::Constant, index),
            None => self.error("Too many constants in one block."),
        }
    }

    /// Emit a forward jump with a placeholder operand; returns the operand
    /// position for [`Compiler::patch_jump`].
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit_op(op);
        self.ctx.block.write_byte(0xff);
        self.ctx.block.write_byte(0xff);
        self.ctx.block.code.len() - 2
    }

    /// Point a previously emitted forward jump at the current offset.
    fn patch_jump(&mut self, operand_pos: usize) {
        // Relative to the byte immediately after the operand pair.
        let mut offset = self.ctx.block.code.len() - (operand_pos + 2);
        if offset > u16::MAX as usize {
            self.error("Too much code to jump over.");
            offset = u16::MAX as usize;
        }
        let bytes = (offset as u16).to_be_bytes();
        self.ctx.block.code[operand_pos] = bytes[0];
        self.ctx.block.code[operand_pos + 1] = bytes[1];
    }

    /// Emit a backward jump to an already-known offset.
    fn emit_jump_back(&mut self, target: usize) {
        self.emit_op(Op::JumpBack);
        let mut offset = self.ctx.block.code.len() + 2 - target;
        if offset > u16::MAX as usize {
            self.error("Loop body contains too much code.");
            offset = u16::MAX as usize;
        }
        let bytes = (offset as u16).to_be_bytes();
        self.ctx.block.write_byte(bytes[0]);
        self.ctx.block.write_byte(bytes[1]);
    }

    // -----------------------------------------------------------------------
    // Scopes & locals
    // -----------------------------------------------------------------------

    fn begin_scope(&mut self) {
        self.ctx.scope_depth += 1;
    }

    /// Close the current scope: one `POP` per local declared at the depth
    /// being left, then truncate the table.
    fn end_scope(&mut self) {
        self.ctx.scope_depth -= 1;
        while self
            .ctx
            .locals
            .last()
            .is_some_and(|local| local.depth > self.ctx.scope_depth)
        {
            self.emit_op(Op::Pop);
            self.ctx.locals.pop();
        }
    }

    /// Record a new local for `token`'s lexeme at the current depth.
    /// Rejects duplicates within the same scope and slot exhaustion.
    fn add_local(&mut self, token: Token<'src>) {
        for local in self.ctx.locals.iter().rev() {
            if local.depth < self.ctx.scope_depth {
                break;
            }
            if local.name == token.lexeme {
                self.error_at(token, "A variable with this name is already declared in this scope.");
                return;
            }
        }
        if self.ctx.locals.len() == MAX_LOCALS {
            self.error_at(token, "Too many local variables in function.");
            return;
        }
        self.ctx.locals.push(Local {
            name: token.lexeme,
            depth: self.ctx.scope_depth,
        });
    }

    /// Search the local table top-down for a name; the index is the slot.
    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.ctx
            .locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|slot| slot as u8)
    }

    // -----------------------------------------------------------------------
    // Declarations & statements
    // -----------------------------------------------------------------------

    fn declaration(&mut self) -> Result<()> {
        if self.match_token(TokenKind::Let)? {
            self.let_declaration()?;
        } else if self.match_token(TokenKind::Fun)? {
            self.fun_declaration()?;
        } else if self.match_token(TokenKind::Struct)? {
            self.struct_declaration()?;
        } else {
            self.statement()?;
        }
        if self.panic_mode {
            self.synchronize()?;
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<()> {
        if self.match_token(TokenKind::Print)? {
            self.print_statement()
        } else if self.match_token(TokenKind::Exit)? {
            self.exit_statement()
        } else if self.match_token(TokenKind::Return)? {
            self.return_statement()
        } else if self.match_token(TokenKind::If)? {
            self.if_statement()
        } else if self.match_token(TokenKind::While)? {
            self.while_statement()
        } else if self.match_token(TokenKind::For)? {
            self.for_statement()
        } else if self.match_token(TokenKind::LBrace)? {
            self.begin_scope();
            self.block_statement()?;
            self.end_scope();
            Ok(())
        } else {
            self.expression_statement()
        }
    }

    /// `let NAME = EXPR` — a new local inside a scope, otherwise a global
    /// definition followed by its first assignment.
    fn let_declaration(&mut self) -> Result<()> {
        self.consume(TokenKind::Identifier, "Expected variable name.")?;
        let name = self.previous;
        self.consume(TokenKind::Equal, "Expected '=' after variable name.")?;

        if self.ctx.scope_depth > 0 {
            // The initializer's value stays on the stack as the new slot.
            // The local is added after the initializer compiles, so the
            // name cannot resolve to itself inside its own initializer.
            self.expression()?;
            self.add_local(name);
        } else {
            let name_ref = self.heap.intern(name.lexeme);
            self.emit_constant(Value::Obj(name_ref));
            self.emit_op(Op::GlobalDefine);
            self.expression()?;
            self.emit_constant(Value::Obj(name_ref));
            self.emit_op(Op::GlobalSet);
            self.globals.set(name.lexeme, Value::Null);
        }
        self.match_token(TokenKind::Semicolon)?;
        Ok(())
    }

    /// `fun NAME(params) { body }` — top level only. The function object
    /// is built at compile time; the enclosing block registers it under
    /// NAME in globals. NAME is known before the body compiles so the
    /// function can call itself.
    fn fun_declaration(&mut self) -> Result<()> {
        self.consume(TokenKind::Identifier, "Expected function name.")?;
        let name = self.previous;
        if self.ctx.scope_depth > 0 {
            self.error_at(name, "Functions are only allowed at the top level.");
        }
        let name_ref = self.heap.intern(name.lexeme);
        self.globals.set(name.lexeme, Value::Null);

        let enclosing = std::mem::replace(&mut self.ctx, FuncCtx::function());

        self.consume(TokenKind::LParen, "Expected '(' after function name.")?;
        if !self.check(TokenKind::RParen) {
            loop {
                self.consume(TokenKind::Identifier, "Expected parameter name.")?;
                let param = self.previous;
                if self.ctx.arity == u8::MAX {
                    self.error_at(param, "Can't have more than 255 parameters.");
                } else {
                    self.ctx.arity += 1;
                }
                self.add_local(param);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after parameters.")?;
        self.consume(TokenKind::LBrace, "Expected '{' before function body.")?;
        self.block_statement()?;
        self.emit_op(Op::Return);

        let finished = std::mem::replace(&mut self.ctx, enclosing);
        let function = self.heap.alloc(Obj::Function(Function {
            name: name_ref,
            arity: finished.arity,
            block: finished.block,
        }));
        self.emit_constant(Value::Obj(function));
        self.emit_constant(Value::Obj(name_ref));
        self.emit_op(Op::GlobalSet);
        Ok(())
    }

    /// `struct NAME { f1, f2, ... }` — builds the template at compile
    /// time with a field→ordinal mapping; registers it as a local when
    /// nested, as a global otherwise.
    fn struct_declaration(&mut self) -> Result<()> {
        self.consume(TokenKind::Identifier, "Expected struct name.")?;
        let name = self.previous;
        let name_ref = self.heap.intern(name.lexeme);
        self.consume(TokenKind::LBrace, "Expected '{' after struct name.")?;

        let mut fields = Table::new();
        let mut ordinal = 0.0;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.consume(TokenKind::Identifier, "Expected field name.")?;
            let field = self.previous;
            if fields.contains(field.lexeme) {
                self.error_at(field, "Duplicate field name.");
            } else {
                fields.set(field.lexeme, Value::Number(ordinal));
                ordinal += 1.0;
            }
            if !self.match_token(TokenKind::Comma)? {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after struct fields.")?;

        let template = self.heap.alloc(Obj::StructTemplate(StructTemplate {
            name: name_ref,
            fields,
        }));
        if self.ctx.scope_depth > 0 {
            self.emit_constant(Value::Obj(template));
            self.add_local(name);
        } else {
            self.emit_constant(Value::Obj(template));
            self.emit_constant(Value::Obj(name_ref));
            self.emit_op(Op::GlobalSet);
            self.globals.set(name.lexeme, Value::Null);
        }
        Ok(())
    }

    fn print_statement(&mut self) -> Result<()> {
        self.expression()?;
        self.match_token(TokenKind::Semicolon)?;
        self.emit_op(Op::Print);
        Ok(())
    }

    fn exit_statement(&mut self) -> Result<()> {
        self.expression()?;
        self.match_token(TokenKind::Semicolon)?;
        self.emit_op(Op::Exit);
        Ok(())
    }

    fn return_statement(&mut self) -> Result<()> {
        if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.check(TokenKind::Eof)
        {
            self.emit_constant(Value::Null);
        } else {
            self.expression()?;
        }
        self.match_token(TokenKind::Semicolon)?;
        self.emit_op(Op::Return);
        Ok(())
    }

    fn if_statement(&mut self) -> Result<()> {
        self.consume(TokenKind::LParen, "Expected '(' after 'if'.")?;
        self.expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after condition.")?;

        let then_jump = self.emit_jump(Op::CJumpF);
        self.statement()?;

        if self.match_token(TokenKind::Else)? {
            let else_jump = self.emit_jump(Op::Jump);
            self.patch_jump(then_jump);
            self.statement()?;
            self.patch_jump(else_jump);
        } else {
            self.patch_jump(then_jump);
        }
        Ok(())
    }

    fn while_statement(&mut self) -> Result<()> {
        let loop_start = self.ctx.block.code.len();
        self.consume(TokenKind::LParen, "Expected '(' after 'while'.")?;
        self.expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after condition.")?;

        let exit_jump = self.emit_jump(Op::CJumpF);
        self.statement()?;
        self.emit_jump_back(loop_start);
        self.patch_jump(exit_jump);
        Ok(())
    }

    /// `for (INIT; COND; POST) STMT` lowers to a triangle: the condition
    /// falls through to a jump over POST into the body; POST jumps back to
    /// the condition; the body jumps back to POST.
    fn for_statement(&mut self) -> Result<()> {
        self.consume(TokenKind::LParen, "Expected '(' after 'for'.")?;
        self.begin_scope();

        // INIT
        if self.match_token(TokenKind::Semicolon)? {
            // No initializer.
        } else if self.match_token(TokenKind::Let)? {
            self.let_declaration()?;
        } else {
            self.expression_statement()?;
        }

        // COND
        let cond_start = self.ctx.block.code.len();
        let exit_jump = if !self.check(TokenKind::Semicolon) {
            self.expression()?;
            Some(self.emit_jump(Op::CJumpF))
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after loop condition.")?;

        // POST
        let body_jump = self.emit_jump(Op::Jump);
        let post_start = self.ctx.block.code.len();
        if !self.check(TokenKind::RParen) {
            self.wrote_assignment = false;
            self.expression()?;
            if !self.wrote_assignment {
                self.emit_op(Op::Pop);
            }
        }
        self.emit_jump_back(cond_start);
        self.consume(TokenKind::RParen, "Expected ')' after for clauses.")?;

        self.patch_jump(body_jump);
        self.statement()?;
        self.emit_jump_back(post_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
        }
        self.end_scope();
        Ok(())
    }

    /// Statements until the matching `}`. The caller manages the scope.
    fn block_statement(&mut self) -> Result<()> {
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.declaration()?;
        }
        self.consume(TokenKind::RBrace, "Expected '}' after block.")?;
        Ok(())
    }

    fn expression_statement(&mut self) -> Result<()> {
        self.wrote_assignment = false;
        self.expression()?;
        self.match_token(TokenKind::Semicolon)?;
        // Assignment opcodes already consume their value; anything else
        // leaves one behind to discard.
        if !self.wrote_assignment {
            self.emit_op(Op::Pop);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expression(&mut self) -> Result<()> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, min: Precedence) -> Result<()> {
        self.advance()?;
        let prefix = match Self::rule(self.previous.kind).prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expected expression.");
                return Ok(());
            }
        };
        let can_assign = min <= Precedence::Assignment;
        prefix(self, can_assign)?;

        while Self::rule(self.current.kind).precedence >= min
            && Self::rule(self.current.kind).precedence != Precedence::None
        {
            self.advance()?;
            if let Some(infix) = Self::rule(self.previous.kind).infix {
                infix(self, can_assign)?;
            }
        }

        if can_assign && self.match_token(TokenKind::Equal)? {
            self.error("Invalid assignment target.");
        }
        Ok(())
    }

    /// The Pratt table: token kind → { prefix, infix, precedence }.
    fn rule(kind: TokenKind) -> ParseRule<'src, 'h> {
        use TokenKind::*;
        let (prefix, infix, precedence): (
            Option<ParseFn<'src, 'h>>,
            Option<ParseFn<'src, 'h>>,
            Precedence,
        ) = match kind {
            LParen => (Some(Self::grouping), Some(Self::call), Precedence::Call),
            LBracket => (Some(Self::list_literal), None, Precedence::None),
            Dot => (None, Some(Self::dot), Precedence::Call),
            Colon => (None, Some(Self::subscript), Precedence::Call),
            Minus => (Some(Self::unary), Some(Self::binary), Precedence::Term),
            Plus => (None, Some(Self::binary), Precedence::Term),
            Star | Slash => (None, Some(Self::binary), Precedence::Factor),
            Bang => (Some(Self::unary), None, Precedence::None),
            EqualEqual | BangEqual => (None, Some(Self::binary), Precedence::Equality),
            Less | LessEqual | Greater | GreaterEqual => {
                (None, Some(Self::binary), Precedence::Comparison)
            }
            AndAnd => (None, Some(Self::and), Precedence::And),
            OrOr => (None, Some(Self::or), Precedence::Or),
            Integer | Floating => (Some(Self::number), None, Precedence::None),
            Str => (Some(Self::string), None, Precedence::None),
            True | False | Null => (Some(Self::literal), None, Precedence::None),
            Identifier => (Some(Self::variable), None, Precedence::None),
            _ => (None, None, Precedence::None),
        };
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }

    fn number(&mut self, _can_assign: bool) -> Result<()> {
        match self.previous.lexeme.parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
        Ok(())
    }

    fn string(&mut self, _can_assign: bool) -> Result<()> {
        // The lexeme keeps its surrounding quotes.
        let lexeme = self.previous.lexeme;
        let content = &lexeme[1..lexeme.len() - 1];
        let string = self.heap.intern(content);
        self.emit_constant(Value::Obj(string));
        Ok(())
    }

    fn literal(&mut self, _can_assign: bool) -> Result<()> {
        let value = match self.previous.kind {
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            _ => Value::Null,
        };
        self.emit_constant(value);
        Ok(())
    }

    fn grouping(&mut self, _can_assign: bool) -> Result<()> {
        self.expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after expression.")
    }

    fn unary(&mut self, _can_assign: bool) -> Result<()> {
        let op_kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary)?;
        match op_kind {
            TokenKind::Minus => self.emit_op(Op::Negate),
            _ => self.emit_op(Op::Not),
        }
        Ok(())
    }

    fn binary(&mut self, _can_assign: bool) -> Result<()> {
        let op_kind = self.previous.kind;
        let precedence = Self::rule(op_kind).precedence;
        self.parse_precedence(precedence.next())?;
        let op = match op_kind {
            TokenKind::Plus => Op::Add,
            TokenKind::Minus => Op::Sub,
            TokenKind::Star => Op::Mul,
            TokenKind::Slash => Op::Div,
            TokenKind::Less => Op::Lt,
            TokenKind::Greater => Op::Gt,
            TokenKind::LessEqual => Op::Lte,
            TokenKind::GreaterEqual => Op::Gte,
            TokenKind::EqualEqual => Op::Eq,
            _ => Op::Neq,
        };
        self.emit_op(op);
        Ok(())
    }

    /// `a && b`: keep a copy of the left operand as the result when it is
    /// falsy, jumping over the right operand entirely.
    fn and(&mut self, _can_assign: bool) -> Result<()> {
        self.emit_op(Op::Dupe);
        let end_jump = self.emit_jump(Op::CJumpF);
        self.emit_op(Op::Pop);
        self.parse_precedence(Precedence::And.next())?;
        self.patch_jump(end_jump);
        Ok(())
    }

    /// `a || b`: mirror image of `&&` with a jump on truth.
    fn or(&mut self, _can_assign: bool) -> Result<()> {
        self.emit_op(Op::Dupe);
        let end_jump = self.emit_jump(Op::CJumpT);
        self.emit_op(Op::Pop);
        self.parse_precedence(Precedence::Or.next())?;
        self.patch_jump(end_jump);
        Ok(())
    }

    /// Identifier reference: locals first, then known globals.
    fn variable(&mut self, can_assign: bool) -> Result<()> {
        let name = self.previous;
        if let Some(slot) = self.resolve_local(name.lexeme) {
            if can_assign && self.match_token(TokenKind::Equal)? {
                self.expression()?;
                self.emit_op_byte(Op::LocalSet, slot);
                self.wrote_assignment = true;
            } else {
                self.emit_op_byte(Op::LocalGet, slot);
            }
        } else {
            if !self.globals.contains(name.lexeme) {
                self.error_at(name, &format!("Undefined variable '{}'.", name.lexeme));
                return Ok(());
            }
            let name_ref = self.heap.intern(name.lexeme);
            if can_assign && self.match_token(TokenKind::Equal)? {
                self.expression()?;
                self.emit_constant(Value::Obj(name_ref));
                self.emit_op(Op::GlobalSet);
                self.wrote_assignment = true;
            } else {
                self.emit_constant(Value::Obj(name_ref));
                self.emit_op(Op::GlobalGet);
            }
        }
        Ok(())
    }

    /// `[e1, e2, ...]` — elements, then the count, then `LIST`.
    fn list_literal(&mut self, _can_assign: bool) -> Result<()> {
        let mut count = 0usize;
        if !self.check(TokenKind::RBracket) {
            loop {
                self.expression()?;
                count += 1;
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBracket, "Expected ']' after list elements.")?;
        self.emit_constant(Value::Number(count as f64));
        self.emit_op(Op::List);
        Ok(())
    }

    /// Call postfix: arguments in order, then `CALL argc`.
    fn call(&mut self, _can_assign: bool) -> Result<()> {
        let mut count = 0usize;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression()?;
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after arguments.")?;
        self.emit_op_byte(Op::Call, count.min(255) as u8);
        Ok(())
    }

    /// `EXPR . NAME` — field read, or field write in assignment position.
    fn dot(&mut self, can_assign: bool) -> Result<()> {
        self.consume(TokenKind::Identifier, "Expected field name after '.'.")?;
        let name_ref = self.heap.intern(self.previous.lexeme);
        if can_assign && self.match_token(TokenKind::Equal)? {
            self.expression()?;
            self.emit_constant(Value::Obj(name_ref));
            self.emit_op(Op::FieldSet);
            self.wrote_assignment = true;
        } else {
            self.emit_constant(Value::Obj(name_ref));
            self.emit_op(Op::FieldGet);
        }
        Ok(())
    }

    /// `EXPR : EXPR` — receiver, subscript, `INDEX`.
    fn subscript(&mut self, _can_assign: bool) -> Result<()> {
        self.parse_precedence(Precedence::Unary)?;
        self.emit_op(Op::Index);
        Ok(())
    }
}
