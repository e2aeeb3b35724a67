use std::collections::HashMap;

use crate::forth::{Cell, Forth, ForthError};

/// Forth's boolean encoding: all bits set for true.
const TRUE: i64 = -1;
const FALSE: i64 = 0;

pub(crate) fn pop1(stack: &mut Vec<Cell>) -> Result<Cell, ForthError> {
    stack.pop().ok_or(ForthError::StackUnderflow)
}

/// Pops the top two cells, returning them top first. Nothing is popped
/// unless both are present.
pub(crate) fn pop2(stack: &mut Vec<Cell>) -> Result<(Cell, Cell), ForthError> {
    if stack.len() < 2 {
        return Err(ForthError::StackUnderflow);
    }
    match (stack.pop(), stack.pop()) {
        (Some(v1), Some(v2)) => Ok((v1, v2)),
        _ => Err(ForthError::StackUnderflow),
    }
}

/// Binary integer words. The first popped cell is the right-hand operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ForthOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    Less,
    Greater,
}

impl ForthOperator {
    pub const ALL: [Self; 7] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Equal,
        Self::Less,
        Self::Greater,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Equal => "=",
            Self::Less => "<",
            Self::Greater => ">",
        }
    }

    pub fn eval(&self, stack: &mut Vec<Cell>) -> Result<(), ForthError> {
        let (op1, op2) = pop2(stack)?;
        let (rhs, lhs) = (op1.as_int()?, op2.as_int()?);
        let overflow = || ForthError::Overflow(self.name().to_string());
        let result = match self {
            Self::Add => lhs.checked_add(rhs).ok_or_else(overflow)?,
            Self::Subtract => lhs.checked_sub(rhs).ok_or_else(overflow)?,
            Self::Multiply => lhs.checked_mul(rhs).ok_or_else(overflow)?,
            Self::Divide => floor_div(lhs, rhs)?,
            Self::Equal => flag(lhs == rhs),
            Self::Less => flag(lhs < rhs),
            Self::Greater => flag(lhs > rhs),
        };
        stack.push(result.into());
        Ok(())
    }
}

fn flag(value: bool) -> i64 {
    if value {
        TRUE
    } else {
        FALSE
    }
}

/// Integer division rounding toward negative infinity.
fn floor_div(lhs: i64, rhs: i64) -> Result<i64, ForthError> {
    if rhs == 0 {
        return Err(ForthError::DivisionByZero);
    }
    let quotient = lhs
        .checked_div(rhs)
        .ok_or_else(|| ForthError::Overflow(ForthOperator::Divide.name().to_string()))?;
    if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ForthBuiltin {
    Drop,
    Dup,
    Over,
    Swap,
    I,
    J,
    Fetch,
    Store,
}

impl ForthBuiltin {
    pub const ALL: [Self; 8] = [
        Self::Drop,
        Self::Dup,
        Self::Over,
        Self::Swap,
        Self::I,
        Self::J,
        Self::Fetch,
        Self::Store,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Dup => "dup",
            Self::Over => "over",
            Self::Swap => "swap",
            Self::I => "i",
            Self::J => "j",
            Self::Fetch => "@",
            Self::Store => "!",
        }
    }

    pub fn eval(&self, forth: &mut Forth) -> Result<(), ForthError> {
        let stack = &mut forth.stack;
        match self {
            Self::Drop => {
                pop1(stack)?;
            }
            Self::Dup => {
                let value = stack.last().cloned().ok_or(ForthError::StackUnderflow)?;
                stack.push(value);
            }
            Self::Over => {
                if stack.len() < 2 {
                    return Err(ForthError::StackUnderflow);
                }
                let value = stack[stack.len() - 2].clone();
                stack.push(value);
            }
            Self::Swap => {
                let (value1, value2) = pop2(stack)?;
                stack.push(value1);
                stack.push(value2);
            }
            Self::I => {
                let index = forth
                    .loops
                    .last()
                    .copied()
                    .ok_or_else(|| ForthError::LoopContextMissing("i".to_string()))?;
                stack.push(index.into());
            }
            Self::J => {
                let depth = forth.loops.len();
                if depth < 2 {
                    return Err(ForthError::LoopContextMissing("j".to_string()));
                }
                stack.push(forth.loops[depth - 2].into());
            }
            Self::Fetch => {
                let name = variable_name(pop1(stack)?, &forth.variables)?;
                let value = forth.variables[&name];
                stack.push(value.into());
            }
            Self::Store => {
                let (target, value) = pop2(stack)?;
                let name = variable_name(target, &forth.variables)?;
                let value = value.as_int()?;
                forth.variables.insert(name, value);
            }
        }

        Ok(())
    }
}

fn variable_name(cell: Cell, variables: &HashMap<String, i64>) -> Result<String, ForthError> {
    match cell {
        Cell::Var(name) if variables.contains_key(&name) => Ok(name),
        other => Err(ForthError::UndeclaredVariable(other.to_string())),
    }
}
