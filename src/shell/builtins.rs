//! Commands the internal shell implements itself
//!
//! These run in-process so scripts behave the same on every platform.
//! `not` is handled by the interpreter because it wraps another command.

use std::path::{Path, PathBuf};

use super::ShellState;

/// Output of a built-in command
#[derive(Debug, Default)]
pub struct BuiltinOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl BuiltinOutput {
    fn ok() -> Self {
        Self::default()
    }

    fn fail(message: String) -> Self {
        Self {
            code: 1,
            stdout: Vec::new(),
            stderr: format!("{}\n", message).into_bytes(),
        }
    }
}

pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "true" | "false" | ":" | "echo" | "cd" | "export" | "mkdir" | "rm"
    )
}

/// Split leading `-xyz` flags off `args`
fn flags(args: &[String]) -> (Vec<char>, &[String]) {
    let mut letters = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--" {
            i += 1;
            break;
        }
        if arg.len() < 2 || !arg.starts_with('-') {
            break;
        }
        letters.extend(arg[1..].chars());
        i += 1;
    }
    (letters, &args[i..])
}

fn resolve(state: &ShellState, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        state.cwd.join(path)
    }
}

/// Run built-in `args[0]`
pub fn run(args: &[String], state: &mut ShellState) -> BuiltinOutput {
    let (name, rest) = match args.split_first() {
        Some((name, rest)) => (name.as_str(), rest),
        None => return BuiltinOutput::ok(),
    };

    match name {
        "true" | ":" => BuiltinOutput::ok(),
        "false" => BuiltinOutput {
            code: 1,
            ..Default::default()
        },
        "echo" => echo(rest),
        "cd" => cd(rest, state),
        "export" => export(rest, state),
        "mkdir" => mkdir(rest, state),
        "rm" => rm(rest, state),
        other => BuiltinOutput::fail(format!("{}: not a built-in", other)),
    }
}

fn echo(args: &[String]) -> BuiltinOutput {
    let (newline, words) = match args.first() {
        Some(flag) if flag == "-n" => (false, &args[1..]),
        _ => (true, args),
    };
    let mut text = words.join(" ");
    if newline {
        text.push('\n');
    }
    BuiltinOutput {
        code: 0,
        stdout: text.into_bytes(),
        stderr: Vec::new(),
    }
}

fn cd(args: &[String], state: &mut ShellState) -> BuiltinOutput {
    let [dir] = args else {
        return BuiltinOutput::fail("cd: expected exactly one directory".to_string());
    };
    let target = resolve(state, dir);
    if !target.is_dir() {
        return BuiltinOutput::fail(format!("cd: {}: No such directory", dir));
    }
    state.cwd = target;
    BuiltinOutput::ok()
}

fn export(args: &[String], state: &mut ShellState) -> BuiltinOutput {
    for arg in args {
        match arg.split_once('=') {
            Some((name, _)) if name.is_empty() => {
                return BuiltinOutput::fail(format!("export: '{}': not a valid name", arg));
            }
            Some((name, value)) => {
                state.env.insert(name.to_string(), value.to_string());
            }
            None => {}
        }
    }
    BuiltinOutput::ok()
}

fn mkdir(args: &[String], state: &ShellState) -> BuiltinOutput {
    let (flags, dirs) = flags(args);
    let parents = flags.contains(&'p');
    if dirs.is_empty() {
        return BuiltinOutput::fail("mkdir: missing operand".to_string());
    }
    for dir in dirs {
        let path = resolve(state, dir);
        let result = if parents {
            std::fs::create_dir_all(&path)
        } else {
            std::fs::create_dir(&path)
        };
        if let Err(e) = result {
            return BuiltinOutput::fail(format!("mkdir: {}: {}", dir, e));
        }
    }
    BuiltinOutput::ok()
}

fn rm(args: &[String], state: &ShellState) -> BuiltinOutput {
    let (flags, paths) = flags(args);
    let recursive = flags.iter().any(|c| matches!(c, 'r' | 'R'));
    let force = flags.contains(&'f');

    for arg in paths {
        let path = resolve(state, arg);
        let result = match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() && recursive => std::fs::remove_dir_all(&path),
            Ok(meta) if meta.is_dir() => {
                return BuiltinOutput::fail(format!("rm: {}: is a directory", arg));
            }
            Ok(_) => std::fs::remove_file(&path),
            Err(_) if force => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            return BuiltinOutput::fail(format!("rm: {}: {}", arg, e));
        }
    }
    BuiltinOutput::ok()
}
