use std::{env, fmt, path::PathBuf};

/// The program is invoked as `interp <source_file>` — one required
/// positional argument, nothing else.
#[derive(Debug, Clone)]
pub struct Args {
    pub source_file: PathBuf,
}

#[derive(Debug, Clone)]
pub enum ArgsError {
    MissingSourceFile,
    TooManyArguments,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSourceFile => write!(f, "usage: interp <source_file>"),
            Self::TooManyArguments => write!(f, "usage: interp <source_file>: too many arguments"),
        }
    }
}

pub fn parse_args() -> Result<Args, ArgsError> {
    from_args(env::args().skip(1))
}

fn from_args(mut iter: impl Iterator<Item = String>) -> Result<Args, ArgsError> {
    let source_file = iter.next().ok_or(ArgsError::MissingSourceFile)?;
    if iter.next().is_some() {
        return Err(ArgsError::TooManyArguments);
    }
    Ok(Args {
        source_file: PathBuf::from(source_file),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_single_path() {
        let args = from_args(["script.lua".to_owned()].into_iter()).unwrap();
        assert_eq!(args.source_file, PathBuf::from("script.lua"));
    }

    #[test]
    fn rejects_no_arguments() {
        let err = from_args(std::iter::empty()).unwrap_err();
        assert!(matches!(err, ArgsError::MissingSourceFile));
    }

    #[test]
    fn rejects_extra_arguments() {
        let err = from_args(["a.lua".to_owned(), "b.lua".to_owned()].into_iter()).unwrap_err();
        assert!(matches!(err, ArgsError::TooManyArguments));
    }
}
