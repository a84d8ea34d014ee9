//! Line-oriented interactive prompts.

use std::io::{self, BufRead, Write};

use hermes_core::RemoteTarget;

/// Reads answers line by line from `input`, writing labels to `output`.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `None` once input is exhausted.
    fn read_line(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Free-form answer; empty when left blank or at end of input.
    pub fn ask(&mut self, label: &str) -> io::Result<String> {
        Ok(self.read_line(label)?.unwrap_or_default())
    }

    /// Answer that must not be blank. Re-asks until given; fails at end of
    /// input.
    pub fn ask_required(&mut self, label: &str) -> io::Result<String> {
        loop {
            match self.read_line(label)? {
                Some(answer) if !answer.is_empty() => return Ok(answer),
                Some(_) => writeln!(self.output, "{label} cannot be empty, please retry.")?,
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("no answer for '{label}'"),
                    ))
                }
            }
        }
    }

    /// Shows `[current]`; a blank answer keeps it.
    pub fn ask_default(&mut self, label: &str, current: &str) -> io::Result<String> {
        let answer = self.read_line(&format!("{label} [{current}]"))?.unwrap_or_default();
        Ok(if answer.is_empty() {
            current.to_string()
        } else {
            answer
        })
    }

    pub fn confirm(&mut self, label: &str) -> io::Result<bool> {
        Ok(self.ask(&format!("{label} (y/n)"))?.eq_ignore_ascii_case("y"))
    }

    /// Collect remotes until a blank name. May return none.
    pub fn ask_remotes(&mut self) -> io::Result<Vec<RemoteTarget>> {
        let mut remotes = Vec::new();
        loop {
            let name = self.ask("Remote name (blank to finish)")?;
            if name.is_empty() {
                return Ok(remotes);
            }
            let bucket = self.ask_required(&format!("Bucket for {name}"))?;
            remotes.push(RemoteTarget::new(name, bucket));
        }
    }

    /// Walk the existing remotes offering each as the default, then allow
    /// more. A blank name with no default ends the list.
    pub fn ask_remotes_with_defaults(&mut self, current: &[RemoteTarget]) -> io::Result<Vec<RemoteTarget>> {
        let mut remotes = Vec::new();
        for index in 0.. {
            let existing = current.get(index).cloned().unwrap_or_default();
            let name = self.ask_default(&format!("Remote #{} name", index + 1), &existing.name)?;
            if name.is_empty() {
                break;
            }
            let bucket = self.ask_default(&format!("Remote #{} bucket", index + 1), &existing.bucket)?;
            remotes.push(RemoteTarget::new(name, bucket));
            if !self.confirm("Add/keep another remote?")? {
                break;
            }
        }
        Ok(remotes)
    }
}

/// Split a comma list, trimming entries and dropping blanks.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn default_kept_on_blank_answer() {
        let mut p = prompter("\nnew\n");
        assert_eq!(p.ask_default("Cron", "0 3 * * *").expect("answer"), "0 3 * * *");
        assert_eq!(p.ask_default("Cron", "0 3 * * *").expect("answer"), "new");
        let shown = String::from_utf8(p.output).expect("utf8");
        assert!(shown.contains("Cron [0 3 * * *]: "));
    }

    #[test]
    fn required_answer_reprompts_then_fails_at_eof() {
        let mut p = prompter("\n  \nnotes\n");
        assert_eq!(p.ask_required("Project name").expect("answer"), "notes");
        let err = p.ask_required("Project name").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn remotes_until_blank_name() {
        let mut p = prompter("minio\nnotes\ns3\n\narchive\n\n");
        let remotes = p.ask_remotes().expect("remotes");
        assert_eq!(
            remotes,
            vec![RemoteTarget::new("minio", "notes"), RemoteTarget::new("s3", "archive")]
        );
    }

    #[test]
    fn remotes_with_defaults_keep_and_extend() {
        let current = vec![RemoteTarget::new("minio", "notes")];
        let mut p = prompter("\n\ny\ns3\narchive\nn\n");
        let remotes = p.ask_remotes_with_defaults(&current).expect("remotes");
        assert_eq!(
            remotes,
            vec![RemoteTarget::new("minio", "notes"), RemoteTarget::new("s3", "archive")]
        );
    }

    #[test]
    fn csv_trims_and_drops_blanks() {
        assert_eq!(split_csv(" /a, /b ,,"), vec!["/a", "/b"]);
        assert!(split_csv("").is_empty());
    }
}
