use std::io::{self, BufRead, Write};

/// Warning shown before a database is dropped.
pub const DROP_WARNING: &str =
    "This command deletes an entire database and its history. This operation is not recoverable. Proceed? y/n\n";

/// The only answer that confirms a destructive action.
pub const AFFIRMATIVE: &str = "y";

/// Writes `warning`, then reads one line and reports whether it is exactly
/// [`AFFIRMATIVE`] once surrounding whitespace is trimmed.
///
/// # Errors
///
/// Fails if the warning cannot be written, or if the input cannot be read or
/// ends before a full line arrives.
pub fn confirm<R, W>(input: &mut R, output: &mut W, warning: &str) -> io::Result<bool>
where
    R: BufRead,
    W: Write,
{
    output.write_all(warning.as_bytes())?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if !answer.ends_with('\n') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "unexpected end of input",
        ));
    }
    Ok(answer.trim() == AFFIRMATIVE)
}
