use std::io::{self, BufRead, Write};

use log::debug;

pub const PASSWORD_ENV: &str = "rcon_password";

/// Picks the password from the flag, then the `rcon_password` environment
/// variable (if the user confirms), then a masked prompt.
pub fn resolve(flag: Option<&str>) -> io::Result<String> {
    let env = std::env::var(PASSWORD_ENV).ok();
    resolve_with(
        flag,
        env.as_deref(),
        &mut io::stdin().lock(),
        &mut io::stdout(),
        || rpassword::prompt_password("RCON password: "),
    )
}

fn resolve_with<R, W, P>(
    flag: Option<&str>,
    env: Option<&str>,
    input: &mut R,
    output: &mut W,
    prompt: P,
) -> io::Result<String>
where
    R: BufRead,
    W: Write,
    P: FnOnce() -> io::Result<String>,
{
    if let Some(password) = flag.filter(|p| !p.is_empty()) {
        debug!("using password from parameter");
        return Ok(password.to_owned());
    }

    if let Some(password) = env.filter(|p| !p.is_empty()) {
        debug!("using password from os env");
        if confirm(
            input,
            output,
            "RCON password found in environment variables, use for authentication? (y/n) ",
        )? {
            return Ok(password.to_owned());
        }
    }

    let password = prompt()?;
    if password.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no password provided",
        ));
    }
    Ok(password)
}

// Asks until a non-empty answer comes back.
fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    loop {
        write!(output, "{question}")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.eq_ignore_ascii_case("y"));
        }
    }
}
