//! Structural decrease of recursive calls.
//!
//! A group of recursive bindings is structural when each member can be given
//! one decreasing parameter such that every call to a member passes, in that
//! member's decreasing position, a strict sub-part of the caller's decreasing
//! parameter. Sub-parts are `tail(p)`, `head(p)`, `p.field`, nestings of
//! those, and local `let` aliases of them.

use crate::ast::{Binding, ProgramNode, UnaryOpKind};

/// Assignments tried before giving up on a structural proof.
const MAX_ASSIGNMENTS: usize = 4096;

/// What a name in scope stands for while checking one member's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// The caller's decreasing parameter.
    Param,
    /// Known to be strictly smaller than the decreasing parameter.
    Smaller,
    /// A member of the group, by index.
    Member(usize),
    /// Anything else; hides outer bindings of the same name.
    Opaque,
}

struct CallCheck<'g> {
    arities: &'g [usize],
    decreasing: &'g [usize],
    scope: Vec<(String, Role)>,
}

impl CallCheck<'_> {
    fn role(&self, name: &str) -> Option<Role> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, role)| *role)
    }

    fn member<T>(&self, node: &ProgramNode<T>) -> Option<usize> {
        match node.strip_comments() {
            ProgramNode::Variable(var) => match self.role(&var.name) {
                Some(Role::Member(index)) => Some(index),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_smaller<T>(&self, node: &ProgramNode<T>) -> bool {
        match node.strip_comments() {
            ProgramNode::Variable(var) => self.role(&var.name) == Some(Role::Smaller),
            ProgramNode::UnaryOp(op) if matches!(op.op, UnaryOpKind::Head | UnaryOpKind::Tail) => {
                self.reaches_param(&op.operand)
            }
            ProgramNode::FieldAccess(access) => self.reaches_param(&access.object),
            _ => false,
        }
    }

    fn reaches_param<T>(&self, node: &ProgramNode<T>) -> bool {
        match node.strip_comments() {
            ProgramNode::Variable(var) => {
                matches!(self.role(&var.name), Some(Role::Param | Role::Smaller))
            }
            other => self.is_smaller(other),
        }
    }

    fn with_scope<R>(
        &mut self,
        names: impl IntoIterator<Item = (String, Role)>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let mark = self.scope.len();
        self.scope.extend(names);
        let result = f(self);
        self.scope.truncate(mark);
        result
    }

    /// Checks every reference to a group member below `node`.
    fn check<T>(&mut self, node: &ProgramNode<T>) -> Result<(), String> {
        match node {
            ProgramNode::Literal(_) => Ok(()),
            ProgramNode::Variable(var) => match self.role(&var.name) {
                Some(Role::Member(_)) => Err(format!(
                    "`{}` is referenced without being called",
                    var.name
                )),
                _ => Ok(()),
            },
            ProgramNode::Apply(apply) => {
                if let Some(callee) = self.member(&apply.func) {
                    let arity = self.arities[callee];
                    if apply.args.len() != arity {
                        return Err(format!(
                            "call passes {} arguments where {arity} are expected",
                            apply.args.len()
                        ));
                    }
                    let position = self.decreasing[callee];
                    if !self.is_smaller(&apply.args[position]) {
                        return Err(format!(
                            "argument {} of a recursive call is not a strict sub-part",
                            position + 1
                        ));
                    }
                } else {
                    self.check(&apply.func)?;
                }
                apply.args.iter().try_for_each(|arg| self.check(arg))
            }
            ProgramNode::Lambda(lambda) => {
                let names = lambda.params.iter().map(|p| (p.name.clone(), Role::Opaque));
                self.with_scope(names, |this| this.check(&lambda.body))
            }
            ProgramNode::Let(node) => {
                if let Some(bound) = &node.bound {
                    self.check(bound)?;
                }
                let binding = &node.binding;
                let role = if binding.value.mentions(&binding.name) {
                    Role::Opaque
                } else if self.is_smaller(&binding.value) {
                    Role::Smaller
                } else {
                    Role::Opaque
                };
                self.with_scope([(binding.name.clone(), Role::Opaque)], |this| {
                    this.check_binding(binding)
                })?;
                self.with_scope([(binding.name.clone(), role)], |this| this.check(&node.body))
            }
            ProgramNode::LetRec(node) => {
                if let Some(bound) = &node.bound {
                    self.check(bound)?;
                }
                let names: Vec<(String, Role)> = node
                    .bindings
                    .iter()
                    .map(|b| (b.name.clone(), Role::Opaque))
                    .collect();
                self.with_scope(names, |this| {
                    node.bindings
                        .iter()
                        .try_for_each(|b| this.check_binding(b))?;
                    this.check(&node.body)
                })
            }
            ProgramNode::Conditional(cond) => {
                self.check(&cond.condition)?;
                self.check(&cond.then_branch)?;
                self.check(&cond.else_branch)
            }
            ProgramNode::ObjectLiteral(obj) => {
                obj.fields.iter().try_for_each(|(_, value)| self.check(value))
            }
            ProgramNode::ArrayLiteral(arr) => arr.elements.iter().try_for_each(|e| self.check(e)),
            ProgramNode::FieldAccess(access) => self.check(&access.object),
            ProgramNode::BinaryOp(op) => {
                self.check(&op.left)?;
                self.check(&op.right)
            }
            ProgramNode::UnaryOp(op) => self.check(&op.operand),
            ProgramNode::Loop(node) => {
                self.check(&node.count)?;
                self.with_scope([(node.var.clone(), Role::Opaque)], |this| {
                    this.check(&node.body)
                })
            }
            ProgramNode::EffectRequest(effect) => {
                self.check(&effect.target)?;
                match &effect.fallback {
                    Some(fallback) => self.check(fallback),
                    None => Ok(()),
                }
            }
            ProgramNode::Comment(comment) => self.check(&comment.target),
        }
    }

    fn check_binding<T>(&mut self, binding: &Binding<T>) -> Result<(), String> {
        self.check(&binding.value)
    }
}

/// Looks for one decreasing parameter per member. Returns the parameter
/// indices, or the reason the last assignment tried failed.
pub(super) fn find_decreasing<T>(members: &[&Binding<T>]) -> Result<Vec<usize>, String> {
    let mut lambdas = Vec::with_capacity(members.len());
    for member in members {
        match member.value.as_lambda() {
            Some(lambda) if !lambda.params.is_empty() => lambdas.push(lambda),
            Some(_) => return Err(format!("`{}` takes no parameters", member.name)),
            None => return Err(format!("`{}` is not a function", member.name)),
        }
    }
    let arities: Vec<usize> = lambdas.iter().map(|l| l.params.len()).collect();

    let mut assignment = vec![0; members.len()];
    let mut reason = String::from("no recursive call");
    for _ in 0..MAX_ASSIGNMENTS {
        match check_assignment(members, &lambdas, &arities, &assignment) {
            Ok(()) => return Ok(assignment),
            Err(why) => reason = why,
        }
        if !advance(&mut assignment, &arities) {
            break;
        }
    }
    Err(reason)
}

fn check_assignment<T>(
    members: &[&Binding<T>],
    lambdas: &[&crate::ast::Lambda<T>],
    arities: &[usize],
    assignment: &[usize],
) -> Result<(), String> {
    for (index, lambda) in lambdas.iter().enumerate() {
        let mut scope: Vec<(String, Role)> = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), Role::Member(i)))
            .collect();
        for (position, param) in lambda.params.iter().enumerate() {
            let role = if position == assignment[index] {
                Role::Param
            } else {
                Role::Opaque
            };
            scope.push((param.name.clone(), role));
        }
        let mut check = CallCheck {
            arities,
            decreasing: assignment,
            scope,
        };
        check
            .check(&lambda.body)
            .map_err(|why| format!("in `{}`: {why}", members[index].name))?;
    }
    Ok(())
}

/// Odometer step over parameter positions.
fn advance(assignment: &mut [usize], arities: &[usize]) -> bool {
    for (slot, arity) in assignment.iter_mut().zip(arities) {
        *slot += 1;
        if *slot < *arity {
            return true;
        }
        *slot = 0;
    }
    false
}
