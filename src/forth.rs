use std::{
    collections::{HashMap, VecDeque},
    fmt,
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    builtin::{pop1, pop2, ForthBuiltin, ForthOperator},
    config::Config,
};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ForthError {
    #[error("Division by zero!")]
    DivisionByZero,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Unknown word: {0}")]
    UnknownWord(String),
    #[error("Malformed definition: {0}")]
    MalformedDefinition(String),
    #[error("Malformed variable declaration: {0}")]
    MalformedVariable(String),
    #[error("Missing 'loop' for 'do'")]
    MalformedLoop,
    #[error("'{0}' used outside of a deep enough loop")]
    LoopContextMissing(String),
    #[error("Not a variable: {0}")]
    UndeclaredVariable(String),
    #[error("Not a number: {0}")]
    NotANumber(String),
    #[error("Integer overflow in {0}")]
    Overflow(String),
    #[error("Nesting exceeded {0} levels")]
    RecursionLimit(usize),
}

/// One stack slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Int(i64),
    /// Names a declared variable, consumed by `@` and `!`.
    Var(String),
}

impl Cell {
    pub fn as_int(&self) -> Result<i64, ForthError> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Var(name) => Err(ForthError::NotANumber(name.clone())),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Var(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Clone, Debug)]
enum Word {
    Operator(ForthOperator),
    Builtin(ForthBuiltin),
    /// Body tokens, re-dispatched on every call so that later
    /// (re)definitions are picked up.
    User(Rc<[String]>),
}

type Tokens = VecDeque<String>;

/// `-?[0-9]+`
fn is_number(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug)]
pub struct Forth {
    pub(crate) stack: Vec<Cell>,
    pub(crate) variables: HashMap<String, i64>,
    pub(crate) loops: Vec<i64>,
    dictionary: HashMap<String, Word>,
    config: Config,
    depth: usize,
}

impl Default for Forth {
    fn default() -> Self {
        Self::new()
    }
}

impl Forth {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut forth = Self {
            stack: Vec::new(),
            variables: HashMap::new(),
            loops: Vec::new(),
            dictionary: HashMap::new(),
            config,
            depth: 0,
        };
        forth.install_builtins();
        forth
    }

    fn install_builtins(&mut self) {
        for operator in ForthOperator::ALL {
            self.dictionary
                .insert(operator.name().to_string(), Word::Operator(operator));
        }
        for builtin in ForthBuiltin::ALL {
            self.dictionary
                .insert(builtin.name().to_string(), Word::Builtin(builtin));
        }
    }

    /// Evaluates whitespace-separated source text. On error the remaining
    /// input is abandoned; changes already made are kept.
    pub fn eval(&mut self, input: &str) -> Result<(), ForthError> {
        let mut tokens = self.lex(input);
        self.run(&mut tokens)
    }

    /// Evaluates an already split token sequence.
    pub fn eval_tokens<I, S>(&mut self, tokens: I) -> Result<(), ForthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = tokens
            .into_iter()
            .map(|token| token.as_ref().to_lowercase())
            .collect();
        self.run(&mut tokens)
    }

    /// Operand stack, top last.
    pub fn stack(&self) -> &[Cell] {
        &self.stack
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Every word in the dictionary, sorted.
    pub fn words(&self) -> Vec<&str> {
        let mut words: Vec<&str> = self.dictionary.keys().map(String::as_str).collect();
        words.sort_unstable();
        words
    }

    pub fn is_defined(&self, word: &str) -> bool {
        self.dictionary.contains_key(&word.to_lowercase())
    }

    pub fn variables(&self) -> &HashMap<String, i64> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<i64> {
        self.variables.get(&name.to_lowercase()).copied()
    }

    fn lex(&self, input: &str) -> Tokens {
        input
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    fn run(&mut self, tokens: &mut Tokens) -> Result<(), ForthError> {
        while let Some(token) = tokens.pop_front() {
            trace!(%token, depth = self.depth, "dispatch");
            match token.as_str() {
                ":" => self.define_word(tokens)?,
                "variable" => self.define_variable(tokens)?,
                "if" => self.conditional(tokens)?,
                "do" => self.counted_loop(tokens)?,
                _ => self.execute(token)?,
            }
        }
        Ok(())
    }

    fn execute(&mut self, token: String) -> Result<(), ForthError> {
        if self.variables.contains_key(&token) {
            self.stack.push(Cell::Var(token));
            return Ok(());
        }
        match self.dictionary.get(&token).cloned() {
            Some(Word::Operator(operator)) => operator.eval(&mut self.stack),
            Some(Word::Builtin(builtin)) => builtin.eval(self),
            Some(Word::User(body)) => self.nested(body.iter().cloned().collect()),
            None if is_number(&token) => {
                let value: i64 = token
                    .parse()
                    .map_err(|_| ForthError::Overflow(token.clone()))?;
                self.stack.push(value.into());
                Ok(())
            }
            None => Err(ForthError::UnknownWord(token)),
        }
    }

    /// Runs a private token sequence one level deeper.
    fn nested(&mut self, mut tokens: Tokens) -> Result<(), ForthError> {
        if self.depth >= self.config.max_depth {
            return Err(ForthError::RecursionLimit(self.config.max_depth));
        }
        self.depth += 1;
        let result = self.run(&mut tokens);
        self.depth -= 1;
        result
    }

    fn define_word(&mut self, tokens: &mut Tokens) -> Result<(), ForthError> {
        let name = tokens
            .pop_front()
            .ok_or_else(|| ForthError::MalformedDefinition("missing word name".to_string()))?;
        if is_number(&name) {
            return Err(ForthError::MalformedDefinition(format!(
                "cannot redefine number {}",
                name
            )));
        }

        let mut body = Vec::new();
        let mut terminated = false;
        while let Some(token) = tokens.pop_front() {
            if token == ";" {
                terminated = true;
                break;
            }
            body.push(token);
        }
        if !terminated {
            return Err(ForthError::MalformedDefinition(format!(
                "missing ';' in definition of {}",
                name
            )));
        }

        debug!(%name, len = body.len(), "defined word");
        self.dictionary.insert(name, Word::User(body.into()));
        Ok(())
    }

    fn define_variable(&mut self, tokens: &mut Tokens) -> Result<(), ForthError> {
        let name = tokens
            .pop_front()
            .ok_or_else(|| ForthError::MalformedVariable("missing variable name".to_string()))?;
        if is_number(&name) {
            return Err(ForthError::MalformedVariable(format!(
                "cannot use number {} as a name",
                name
            )));
        }
        debug!(%name, "declared variable");
        self.variables.insert(name, 0);
        Ok(())
    }

    /// `if ... [else ...] then`. Only `if`/`then` pairs are counted; other
    /// constructs inside a branch are parsed when the branch runs.
    fn conditional(&mut self, tokens: &mut Tokens) -> Result<(), ForthError> {
        let condition = pop1(&mut self.stack)?.as_int()?;

        let mut true_part = Tokens::new();
        let mut false_part = Tokens::new();
        let mut in_else = false;
        let mut nesting = 0usize;
        while let Some(token) = tokens.pop_front() {
            match token.as_str() {
                "if" => nesting += 1,
                "else" if nesting == 0 => {
                    in_else = true;
                    continue;
                }
                "then" if nesting == 0 => break,
                "then" => nesting -= 1,
                _ => {}
            }
            if in_else {
                false_part.push_back(token);
            } else {
                true_part.push_back(token);
            }
        }

        let branch = if condition != 0 { true_part } else { false_part };
        if branch.is_empty() {
            Ok(())
        } else {
            self.nested(branch)
        }
    }

    /// `limit start do ... loop`, iterating `start..limit`.
    fn counted_loop(&mut self, tokens: &mut Tokens) -> Result<(), ForthError> {
        let (start, limit) = pop2(&mut self.stack)?;
        let (start, limit) = (start.as_int()?, limit.as_int()?);

        let mut body = Vec::new();
        let mut nesting = 0usize;
        let mut terminated = false;
        while let Some(token) = tokens.pop_front() {
            match token.as_str() {
                "do" => nesting += 1,
                "loop" if nesting == 0 => {
                    terminated = true;
                    break;
                }
                "loop" => nesting -= 1,
                _ => {}
            }
            body.push(token);
        }
        if !terminated {
            return Err(ForthError::MalformedLoop);
        }

        debug!(start, limit, "counted loop");
        for index in start..limit {
            self.loops.push(index);
            let result = self.nested(body.iter().cloned().collect());
            self.loops.pop();
            result?;
        }
        Ok(())
    }
}
