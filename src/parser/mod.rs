//! Recursive-descent parser for the dialogue DSL.
//!
//! Consumes the token list produced by [`crate::lexer::Lexer`] and produces a
//! [`Script`]. Any parse failure is recorded in `Script.errors` and the parser
//! resynchronizes on the next `Step` keyword (or `EOF`), so a single malformed
//! step never prevents the rest of the script from being usable.

use crate::ast::{BinaryOp, BranchCase, Expr, Number, ParseError, Script, Statement, Step, UnaryOp};
use crate::lexer::{NumberLiteral, Token, TokenKind};

/// Parses a token stream (already terminated by `Eof`) into a [`Script`].
///
/// This never fails: malformed constructs are recorded in `script.errors` and
/// parsing resumes at the next `Step`. Callers should inspect `script.errors`
/// before treating the script as ready to execute.
pub fn parse(tokens: Vec<Token>) -> Script {
    Parser::new(tokens).parse_script()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// `Branch`/`Silence`/`Default`/`Exit` found while parsing a nested
    /// `If`/`While` block body. The grammar allows them there syntactically;
    /// they hoist to the *enclosing step* exactly as a top-level occurrence
    /// would, so `parse_block` queues them here and `parse_step` drains the
    /// queue after every statement it parses.
    pending_extras: Vec<HoistedExtra>,
}

/// Internal signal for a single failed parse step; carries enough to build a
/// [`ParseError`] at the call site that knows how to recover.
struct Failure {
    message: String,
    line: usize,
    column: usize,
}

type PResult<T> = Result<T, Failure>;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, pending_extras: Vec::new() }
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream always has Eof"))
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn is(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn fail(&self, message: impl Into<String>) -> Failure {
        Failure {
            message: message.into(),
            line: self.current().line,
            column: self.current().column,
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.is(kind) {
            Ok(self.advance())
        } else {
            Err(self.fail(format!("expected {what}")))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> PResult<String> {
        if let TokenKind::Identifier(name) = self.current().kind.clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.fail(format!("expected {what}")))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.current().kind, TokenKind::Newline) {
            self.advance();
        }
    }

    fn parse_script(&mut self) -> Script {
        let mut script = Script::default();
        self.skip_newlines();

        while !self.is_eof() {
            if matches!(self.current().kind, TokenKind::Step) {
                match self.parse_step() {
                    Ok(step) => script.insert_step(step.name.clone(), step),
                    Err(f) => {
                        script.errors.push(ParseError {
                            message: f.message,
                            line: f.line,
                            column: f.column,
                        });
                        self.recover_to_next_step();
                    }
                }
            } else {
                let f = self.fail(format!("expected 'Step', found {:?}", self.current().kind));
                script.errors.push(ParseError {
                    message: f.message,
                    line: f.line,
                    column: f.column,
                });
                self.recover_to_next_step();
            }
            self.skip_newlines();
        }

        script
    }

    fn recover_to_next_step(&mut self) {
        while !matches!(self.current().kind, TokenKind::Step | TokenKind::Eof) {
            self.advance();
        }
    }

    fn parse_step(&mut self) -> PResult<Step> {
        self.expect(&TokenKind::Step, "'Step'")?;
        let name = self.expect_identifier("step name")?;
        let mut step = Step {
            name,
            ..Step::default()
        };
        self.skip_newlines();

        while !matches!(self.current().kind, TokenKind::Step | TokenKind::Eof) {
            self.skip_newlines();
            if matches!(self.current().kind, TokenKind::Step | TokenKind::Eof) {
                break;
            }
            if let Some(stmt) = self.parse_statement()? {
                match stmt {
                    HoistedStatement::Exit => {
                        step.statements.push(Statement::Exit);
                        step.is_exit = true;
                    }
                    other => Self::apply_hoisted(&mut step, other.into_extra()),
                }
            }
            for extra in self.pending_extras.drain(..) {
                Self::apply_hoisted(&mut step, extra);
            }
            self.skip_newlines();
        }

        Ok(step)
    }

    /// Applies one hoisted item (top-level or surfaced from a nested block) to
    /// the step it belongs to.
    fn apply_hoisted(step: &mut Step, extra: HoistedExtra) {
        match extra {
            HoistedExtra::Branch(case) => step.branches.push(case),
            HoistedExtra::Silence(target) => step.silence_handler = Some(target),
            HoistedExtra::Default(target) => step.default_handler = Some(target),
            HoistedExtra::Exit => step.is_exit = true,
            HoistedExtra::Plain(stmt) => step.statements.push(stmt),
        }
    }

    /// `Branch`/`Silence`/`Default` are parsed as statements but never remain in
    /// a step's statement sequence; this wraps the parse result so callers can
    /// hoist them without re-matching on `Statement` variants.
    fn parse_statement(&mut self) -> PResult<Option<HoistedStatement>> {
        let hoisted = match &self.current().kind {
            TokenKind::Speak => HoistedStatement::Plain(self.parse_speak()?),
            TokenKind::Listen => HoistedStatement::Plain(self.parse_listen()?),
            TokenKind::Branch => HoistedStatement::Branch(self.parse_branch()?),
            TokenKind::Silence => HoistedStatement::Silence(self.parse_silence()?),
            TokenKind::Default => HoistedStatement::Default(self.parse_default()?),
            TokenKind::Exit => {
                self.advance();
                HoistedStatement::Exit
            }
            TokenKind::Goto => HoistedStatement::Plain(self.parse_goto()?),
            TokenKind::Set => HoistedStatement::Plain(self.parse_set()?),
            TokenKind::If => HoistedStatement::Plain(self.parse_if()?),
            TokenKind::While => HoistedStatement::Plain(self.parse_while()?),
            TokenKind::Call => HoistedStatement::Plain(self.parse_call()?),
            TokenKind::Newline => {
                self.advance();
                return Ok(None);
            }
            other => return Err(self.fail(format!("unknown statement: {other:?}"))),
        };
        Ok(Some(hoisted))
    }

    /// Parses statements for use inside an `If`/`While` block body. The
    /// grammar still allows `Branch`/`Silence`/`Default`/`Exit` to appear
    /// nested; the original source always hoists them relative to the
    /// *enclosing step* regardless of nesting depth, so they are queued on
    /// `self.pending_extras` for `parse_step` to apply once this block (and
    /// any further nesting above it) has fully unwound.
    fn parse_block(&mut self, stop: &[TokenKind]) -> PResult<Vec<Statement>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if stop.iter().any(|k| self.is(k)) || self.is_eof() {
                break;
            }
            if let Some(stmt) = self.parse_statement()? {
                match stmt {
                    HoistedStatement::Plain(s) => stmts.push(s),
                    HoistedStatement::Exit => {
                        stmts.push(Statement::Exit);
                        self.pending_extras.push(HoistedExtra::Exit);
                    }
                    HoistedStatement::Branch(case) => self.pending_extras.push(HoistedExtra::Branch(case)),
                    HoistedStatement::Silence(t) => self.pending_extras.push(HoistedExtra::Silence(t)),
                    HoistedStatement::Default(t) => self.pending_extras.push(HoistedExtra::Default(t)),
                }
            }
            self.skip_newlines();
        }
        Ok(stmts)
    }

    fn parse_speak(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::Speak, "'Speak'")?;
        let expr = self.parse_expr()?;
        Ok(Statement::Speak(expr))
    }

    fn parse_listen(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::Listen, "'Listen'")?;
        let mut begin_timeout = None;
        let mut end_timeout = None;
        if let TokenKind::Number(n) = self.current().kind.clone() {
            self.advance();
            begin_timeout = Some(number_to_f64(n));
            if matches!(self.current().kind, TokenKind::Comma) {
                self.advance();
                if let TokenKind::Number(n) = self.current().kind.clone() {
                    self.advance();
                    end_timeout = Some(number_to_f64(n));
                }
            }
        }
        Ok(Statement::Listen {
            begin_timeout,
            end_timeout,
        })
    }

    fn parse_branch(&mut self) -> PResult<BranchCase> {
        self.expect(&TokenKind::Branch, "'Branch'")?;
        let intent = self.expect_string("intent string")?;
        if matches!(self.current().kind, TokenKind::Comma) {
            self.advance();
        }
        let target = self.expect_identifier("target step name")?;
        Ok(BranchCase { intent, target })
    }

    fn parse_silence(&mut self) -> PResult<String> {
        self.expect(&TokenKind::Silence, "'Silence'")?;
        self.expect_identifier("target step name")
    }

    fn parse_default(&mut self) -> PResult<String> {
        self.expect(&TokenKind::Default, "'Default'")?;
        self.expect_identifier("target step name")
    }

    fn parse_goto(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::Goto, "'Goto'")?;
        let target = self.expect_identifier("target step name")?;
        Ok(Statement::Goto(target))
    }

    fn parse_set(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::Set, "'Set'")?;
        let var = self.expect_variable("variable name")?;
        self.expect(&TokenKind::Assign, "'='")?;
        let value = self.parse_expr()?;
        Ok(Statement::Set { var, value })
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::If, "'If'")?;
        let cond = self.parse_expr()?;
        self.skip_newlines();
        let then_block = self.parse_block(&[TokenKind::Else, TokenKind::EndIf])?;

        let else_block = if matches!(self.current().kind, TokenKind::Else) {
            self.advance();
            self.skip_newlines();
            Some(self.parse_block(&[TokenKind::EndIf])?)
        } else {
            None
        };

        self.expect(&TokenKind::EndIf, "'EndIf'")?;
        Ok(Statement::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::While, "'While'")?;
        let cond = self.parse_expr()?;
        self.skip_newlines();
        let body = self.parse_block(&[TokenKind::EndWhile])?;
        self.expect(&TokenKind::EndWhile, "'EndWhile'")?;
        Ok(Statement::While { cond, body })
    }

    fn parse_call(&mut self) -> PResult<Statement> {
        self.expect(&TokenKind::Call, "'Call'")?;
        let service = self.expect_identifier("service name")?;

        let mut args = Vec::new();
        if matches!(self.current().kind, TokenKind::LParen) {
            self.advance();
            if !matches!(self.current().kind, TokenKind::RParen) {
                args.push(self.parse_expr()?);
                while matches!(self.current().kind, TokenKind::Comma) {
                    self.advance();
                    args.push(self.parse_expr()?);
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }

        let result_var = if matches!(self.current().kind, TokenKind::Assign) {
            self.advance();
            Some(self.expect_variable("result variable")?)
        } else {
            None
        };

        Ok(Statement::Call {
            service,
            args,
            result_var,
        })
    }

    fn expect_string(&mut self, what: &str) -> PResult<String> {
        if let TokenKind::String(s) = self.current().kind.clone() {
            self.advance();
            Ok(s)
        } else {
            Err(self.fail(format!("expected {what}")))
        }
    }

    fn expect_variable(&mut self, what: &str) -> PResult<String> {
        if let TokenKind::Variable(name) = self.current().kind.clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.fail(format!("expected {what}")))
        }
    }

    // --- Expressions, precedence climbing top to bottom ---

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while matches!(self.current().kind, TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = bin(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while matches!(self.current().kind, TokenKind::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = bin(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Neq => BinaryOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::Le => BinaryOp::Le,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.current().kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::StringLit(s))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::NumberLit(match n {
                    NumberLiteral::Int(i) => Number::Int(i),
                    NumberLiteral::Float(f) => Number::Float(f),
                }))
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if matches!(self.current().kind, TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.current().kind, TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        while matches!(self.current().kind, TokenKind::Comma) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            other => Err(self.fail(format!("invalid expression: {other:?}"))),
        }
    }
}

fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn number_to_f64(n: NumberLiteral) -> f64 {
    match n {
        NumberLiteral::Int(i) => i as f64,
        NumberLiteral::Float(f) => f,
    }
}

/// Result of parsing a single statement, before hoisting is applied.
enum HoistedStatement {
    Plain(Statement),
    Branch(BranchCase),
    Silence(String),
    Default(String),
    Exit,
}

impl HoistedStatement {
    /// Converts to the shared hoisting representation. Never called with
    /// `Exit`, which needs dual handling (`is_exit` plus a literal statement)
    /// only available at the top level — see `parse_step`.
    fn into_extra(self) -> HoistedExtra {
        match self {
            HoistedStatement::Plain(s) => HoistedExtra::Plain(s),
            HoistedStatement::Branch(case) => HoistedExtra::Branch(case),
            HoistedStatement::Silence(t) => HoistedExtra::Silence(t),
            HoistedStatement::Default(t) => HoistedExtra::Default(t),
            HoistedStatement::Exit => unreachable!("Exit handled separately in parse_step"),
        }
    }
}

/// Hoistable items applied to a step: either a plain statement passed
/// straight through, or a `Branch`/`Silence`/`Default`/`Exit` surfaced from
/// anywhere in the step, including nested `If`/`While` bodies.
enum HoistedExtra {
    Plain(Statement),
    Branch(BranchCase),
    Silence(String),
    Default(String),
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_src(src: &str) -> Script {
        let tokens = Lexer::new(src).tokenize().unwrap();
        parse(tokens)
    }

    #[test]
    fn empty_source_yields_empty_script() {
        let script = parse_src("");
        assert!(script.steps.is_empty());
        assert!(script.errors.is_empty());
        assert_eq!(script.entry_step, "");
    }

    #[test]
    fn simple_step_with_speak_and_exit() {
        let script = parse_src("Step hello\n  Speak \"hi\"\n  Exit\n");
        assert_eq!(script.entry_step, "hello");
        let step = script.step("hello").unwrap();
        assert!(step.is_exit);
        assert_eq!(step.statements.len(), 2);
    }

    #[test]
    fn branch_silence_default_are_hoisted_not_left_as_statements() {
        let src = "Step s\n  Speak \"hi\"\n  Listen\n  Branch \"a\", t1\n  Silence t2\n  Default t3\n";
        let script = parse_src(src);
        let step = script.step("s").unwrap();
        assert_eq!(step.statements.len(), 2); // Speak + Listen only
        assert_eq!(step.branches, vec![BranchCase { intent: "a".into(), target: "t1".into() }]);
        assert_eq!(step.silence_handler.as_deref(), Some("t2"));
        assert_eq!(step.default_handler.as_deref(), Some("t3"));
    }

    #[test]
    fn multiple_branches_accumulate_in_order() {
        let src = "Step s\n  Branch \"a\", t1\n  Branch \"b\", t2\n";
        let script = parse_src(src);
        let step = script.step("s").unwrap();
        assert_eq!(step.branches.len(), 2);
        assert_eq!(step.branches[0].intent, "a");
        assert_eq!(step.branches[1].intent, "b");
    }

    #[test]
    fn multiple_silence_overwrites_with_last() {
        let src = "Step s\n  Silence t1\n  Silence t2\n";
        let script = parse_src(src);
        assert_eq!(script.step("s").unwrap().silence_handler.as_deref(), Some("t2"));
    }

    #[test]
    fn branch_comma_is_optional() {
        let a = parse_src("Step s\n  Branch \"a\" t1\n");
        let b = parse_src("Step s\n  Branch \"a\", t1\n");
        assert_eq!(a.step("s").unwrap().branches, b.step("s").unwrap().branches);
    }

    #[test]
    fn branch_nested_inside_if_still_hoists_to_the_step() {
        let src = "Step s\n  If $x\n    Branch \"a\", t1\n  EndIf\n";
        let script = parse_src(src);
        let step = script.step("s").unwrap();
        assert_eq!(step.branches, vec![BranchCase { intent: "a".into(), target: "t1".into() }]);
        // The If statement itself still has an (empty) then-block; Branch
        // never remains inside it.
        match &step.statements[0] {
            Statement::If { then_block, .. } => assert!(then_block.is_empty()),
            other => panic!("expected If statement, got {other:?}"),
        }
    }

    #[test]
    fn exit_nested_inside_while_marks_step_exit_and_stays_in_body() {
        let src = "Step s\n  While $x\n    Exit\n  EndWhile\n";
        let script = parse_src(src);
        let step = script.step("s").unwrap();
        assert!(step.is_exit);
        match &step.statements[0] {
            Statement::While { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("expected While statement, got {other:?}"),
        }
    }

    #[test]
    fn error_recovery_skips_to_next_step() {
        let src = "Step bad\n  Speak\nStep good\n  Exit\n";
        let script = parse_src(src);
        assert!(!script.errors.is_empty());
        assert!(script.errors[0].line >= 1);
        assert!(script.step("good").unwrap().is_exit);
    }

    #[test]
    fn missing_endif_recovers_to_next_step() {
        let src = "Step bad\n  If $x\n    Speak \"y\"\nStep good\n  Exit\n";
        let script = parse_src(src);
        assert!(!script.errors.is_empty());
        assert!(script.step("good").is_some());
        assert!(script.step("bad").is_none());
    }

    #[test]
    fn expression_precedence_is_left_associative() {
        // 1 + 2 * 3 - 4 == parses as (1 + (2*3)) - 4, never re-associated.
        let src = "Step s\n  Set $x = 1 + 2 * 3 - 4\n";
        let script = parse_src(src);
        let step = script.step("s").unwrap();
        if let Statement::Set { value, .. } = &step.statements[0] {
            match value {
                Expr::Binary { op: BinaryOp::Sub, .. } => {}
                other => panic!("expected top-level Sub, got {other:?}"),
            }
        } else {
            panic!("expected Set statement");
        }
    }

    #[test]
    fn bare_identifier_is_a_variable_reference() {
        let src = "Step s\n  Speak name\n";
        let script = parse_src(src);
        if let Statement::Speak(Expr::Variable(name)) = &script.step("s").unwrap().statements[0] {
            assert_eq!(name, "name");
        } else {
            panic!("expected bare identifier to parse as Variable");
        }
    }

    #[test]
    fn function_call_expression() {
        let src = "Step s\n  Set $n = len($items)\n";
        let script = parse_src(src);
        if let Statement::Set { value: Expr::Call { name, args }, .. } = &script.step("s").unwrap().statements[0] {
            assert_eq!(name, "len");
            assert_eq!(args.len(), 1);
        } else {
            panic!("expected Call expression");
        }
    }

    #[test]
    fn call_statement_with_result_var() {
        let src = "Step s\n  Call book(\"x\") = $result\n";
        let script = parse_src(src);
        match &script.step("s").unwrap().statements[0] {
            Statement::Call { service, args, result_var } => {
                assert_eq!(service, "book");
                assert_eq!(args.len(), 1);
                assert_eq!(result_var.as_deref(), Some("result"));
            }
            other => panic!("expected Call statement, got {other:?}"),
        }
    }
}
