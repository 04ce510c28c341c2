use clap::ValueEnum;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::char,
    combinator::{all_consuming, map, opt, rest},
    sequence::{pair, preceded},
    IResult,
};

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ControlAction {
    Install,
    Uninstall,
    Start,
    Stop,
    Restart,
}

impl ControlAction {
    pub(crate) fn parse(arg: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(arg, false).ok()
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Invocation {
    Control {
        action: ControlAction,
        arguments: Vec<String>,
    },
    Run,
}

/// Control verbs go to the service manager, everything else to the engine.
/// Only `install` keeps the arguments after the verb, for the unit's
/// start command.
pub(crate) fn route(argv: &[String]) -> Invocation {
    match argv.get(1).and_then(|arg| ControlAction::parse(arg)) {
        Some(action @ ControlAction::Install) => Invocation::Control {
            action,
            arguments: argv[2..].to_vec(),
        },
        Some(action) => Invocation::Control {
            action,
            arguments: Vec::new(),
        },
        None => Invocation::Run,
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Terminator,
    Flag { name: &'a str, value: Option<&'a str> },
}

#[derive(Debug, PartialEq)]
enum ParseError {
    Help,
    Invalid,
}

fn parse_token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(all_consuming(tag("--")), |_| Token::Terminator),
        map(
            all_consuming(pair(
                preceded(pair(char('-'), opt(char('-'))), take_till1(|c: char| c == '=')),
                opt(preceded(char('='), rest)),
            )),
            |(name, value)| Token::Flag { name, value },
        ),
    ))(input)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Walks legacy single-dash flags the way Go's `flag` package does, with
/// `version` as the only known flag. Parsing stops at the first non-flag
/// argument, at `--`, or at the first error.
fn parse_legacy_flags(args: &[String], version: &mut bool) -> Result<(), ParseError> {
    for arg in args {
        if arg.len() < 2 || !arg.starts_with('-') {
            return Ok(());
        }

        let (name, value) = match parse_token(arg) {
            Ok((_, Token::Terminator)) => return Ok(()),
            Ok((_, Token::Flag { name, value })) => (name, value),
            Err(_) => return Err(ParseError::Invalid),
        };

        if name.starts_with('-') {
            return Err(ParseError::Invalid);
        }

        match name {
            "version" => match value {
                None => *version = true,
                Some(value) => *version = parse_bool(value).ok_or(ParseError::Invalid)?,
            },
            "h" | "help" => return Err(ParseError::Help),
            _ => return Err(ParseError::Invalid),
        }
    }

    Ok(())
}

/// Rewrites a legacy invocation into the engine's subcommand form.
///
/// `args` is the full argument list, program name first. The result always
/// carries a subcommand in position one: either the caller's own, or one of
/// `run`, `version` and `help` inserted here. Flags that are not understood
/// are left for `run`.
pub(crate) fn v4_compatible(args: &[String]) -> Vec<String> {
    let Some((program, rest)) = args.split_first() else {
        return vec![String::new(), "run".to_string()];
    };

    let Some(first) = rest.first() else {
        return vec![program.clone(), "run".to_string()];
    };

    if !first.starts_with('-') {
        return args.to_vec();
    }

    let mut version = false;

    match parse_legacy_flags(rest, &mut version) {
        Err(ParseError::Help) => vec![program.clone(), "help".to_string()],
        _ if version => vec![program.clone(), "version".to_string()],
        _ => {
            let mut rewritten = Vec::with_capacity(args.len() + 1);
            rewritten.push(program.clone());
            rewritten.push("run".to_string());
            rewritten.extend_from_slice(rest);
            rewritten
        }
    }
}

pub(crate) fn is_legacy_run(original: &[String], rewritten: &[String]) -> bool {
    rewritten.get(1).map(String::as_str) == Some("run")
        && original.get(1).is_some_and(|first| first.starts_with('-'))
}
