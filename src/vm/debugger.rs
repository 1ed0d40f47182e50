// Toy Debugger
// Instruction-level stepping, breakpoints and state inspection over Vm::step

use std::fmt::Write as _;

use regex::Regex;
use rustc_hash::FxHashSet;

use super::value::Value;
use super::vm::Vm;
use crate::error::{ToyError, ToyResult};

const DEFAULT_LIST_RADIUS: usize = 5;

pub const HELP: &str = "\
s, step [n]   execute n instructions (default 1)
r, run        run to the next breakpoint or the end
b N           toggle a breakpoint at address N
p NAME        print a variable visible from the current scope
l [N]         list N instructions around the current one
sc            show the scope chain
bt            show the backtrace
st            show the operand stack
q, quit       stop debugging";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Step(usize),
    Run,
    Break(usize),
    Print(String),
    List(usize),
    Scopes,
    Backtrace,
    Stack,
    Help,
    Quit,
}

/// State of the debuggee after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Paused,
    Finished,
    Quit,
}

pub struct Debugger {
    pattern: Regex,
    breakpoints: FxHashSet<usize>,
}

impl Debugger {
    pub fn new() -> ToyResult<Self> {
        let pattern = Regex::new(r"^\s*(step|run|quit|help|sc|bt|st|s|r|b|p|l|q|h)(?:\s+(\S+))?\s*$")
            .map_err(|e| ToyError::runtime_error(format!("Invalid command pattern: {}", e)))?;
        Ok(Self {
            pattern,
            breakpoints: FxHashSet::default(),
        })
    }

    pub fn parse(&self, line: &str) -> Result<Command, String> {
        let captures = self
            .pattern
            .captures(line)
            .ok_or_else(|| format!("Unknown command '{}', try 'h'", line.trim()))?;
        let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let arg = captures.get(2).map(|m| m.as_str());

        let number = |what: &str| -> Result<Option<usize>, String> {
            arg.map(|a| {
                a.parse::<usize>()
                    .map_err(|_| format!("Expected {} but found '{}'", what, a))
            })
            .transpose()
        };

        let command = match name {
            "s" | "step" => Command::Step(number("a count")?.unwrap_or(1)),
            "r" | "run" => Command::Run,
            "b" => Command::Break(number("an address")?.ok_or("Usage: b ADDRESS")?),
            "p" => Command::Print(arg.ok_or("Usage: p NAME")?.to_string()),
            "l" => Command::List(number("a count")?.unwrap_or(DEFAULT_LIST_RADIUS)),
            "sc" => Command::Scopes,
            "bt" => Command::Backtrace,
            "st" => Command::Stack,
            "h" | "help" => Command::Help,
            _ => Command::Quit,
        };
        let takes_arg = matches!(
            command,
            Command::Step(_) | Command::Break(_) | Command::Print(_) | Command::List(_)
        );
        if arg.is_some() && !takes_arg {
            return Err(format!("'{}' takes no argument", name));
        }
        Ok(command)
    }

    pub fn breakpoints(&self) -> Vec<usize> {
        let mut points: Vec<usize> = self.breakpoints.iter().copied().collect();
        points.sort_unstable();
        points
    }

    /// Run one command against `vm`, appending its report to `out`
    pub fn execute(&mut self, vm: &mut Vm, command: Command, out: &mut String) -> ToyResult<Outcome> {
        match command {
            Command::Step(count) => {
                for _ in 0..count {
                    if vm.is_finished() {
                        break;
                    }
                    vm.step()?;
                }
                return Ok(self.report(vm, out));
            }
            Command::Run => {
                while !vm.is_finished() {
                    vm.step()?;
                    if self.breakpoints.contains(&vm.ip()) {
                        let _ = writeln!(out, "Breakpoint at {:04}", vm.ip());
                        break;
                    }
                }
                return Ok(self.report(vm, out));
            }
            Command::Break(address) => {
                if self.breakpoints.remove(&address) {
                    let _ = writeln!(out, "Removed breakpoint at {:04}", address);
                } else {
                    self.breakpoints.insert(address);
                    let _ = writeln!(out, "Breakpoint set at {:04}", address);
                }
            }
            Command::Print(name) => match vm.lookup(&name) {
                Some(value) => {
                    let _ = writeln!(out, "{} = {}", name, value);
                }
                None => {
                    let _ = writeln!(out, "Undefined variable '{}'", name);
                }
            },
            Command::List(radius) => self.list(vm, radius, out),
            Command::Scopes => {
                for (scope, bindings) in vm.scope_chain() {
                    let vars = bindings
                        .iter()
                        .map(|(name, value)| format!("{} = {}", name, value))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = writeln!(out, "scope #{}: {}", scope.index(), vars);
                }
            }
            Command::Backtrace => {
                for frame in vm.backtrace() {
                    let _ = writeln!(out, "{}", frame);
                }
            }
            Command::Stack => {
                let _ = writeln!(out, "{}", format_stack(vm));
            }
            Command::Help => {
                let _ = writeln!(out, "{}", HELP);
            }
            Command::Quit => return Ok(Outcome::Quit),
        }
        Ok(if vm.is_finished() {
            Outcome::Finished
        } else {
            Outcome::Paused
        })
    }

    /// Next instruction and operand stack, or the end of the program
    fn report(&self, vm: &Vm, out: &mut String) -> Outcome {
        if vm.is_finished() {
            let _ = writeln!(out, "Program finished");
            return Outcome::Finished;
        }
        let _ = writeln!(out, "[{}] {}", vm.current_name(), vm.chunk().format_instruction(vm.ip()));
        let _ = writeln!(out, "    {}", format_stack(vm));
        Outcome::Paused
    }

    fn list(&self, vm: &Vm, radius: usize, out: &mut String) {
        let chunk = vm.chunk();
        let ip = vm.ip();
        let first = ip.saturating_sub(radius).max(chunk.base);
        let last = (ip + radius).min(chunk.end().saturating_sub(1));
        for address in first..=last {
            let marker = if address == ip { "=>" } else { "  " };
            let point = if self.breakpoints.contains(&address) { "*" } else { " " };
            let _ = writeln!(out, "{}{} {}", marker, point, chunk.format_instruction(address));
        }
    }
}

fn format_stack(vm: &Vm) -> String {
    let values = vm
        .stack_values()
        .iter()
        .map(|v| match v {
            Value::String(s) => format!("{:?}", s),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("stack: [{}]", values)
}
