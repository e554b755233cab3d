use std::{
    borrow::Cow,
    io::{self, Write},
};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};

use super::input::{apply_key, KeyDecoder};

/// Oldest lines are dropped past this point.
const MAX_SCROLLBACK: usize = 10_000;

/// The part of the scrollback that fits on screen. The first line may be cut:
/// its leading `clipped_rows` wrapped rows do not fit.
#[derive(Debug, Clone, Copy)]
pub struct Tail<'a> {
    pub lines: &'a [String],
    pub clipped_rows: usize,
}

impl<'a> Tail<'a> {
    /// Lines ready to print at `width` columns.
    pub fn printable(self, width: u16) -> impl Iterator<Item = Cow<'a, str>> {
        let skip = self.clipped_rows * usize::from(width.max(1));
        self.lines.iter().enumerate().map(move |(i, line)| {
            if i == 0 && skip > 0 {
                Cow::Owned(drop_columns(line, skip))
            } else {
                Cow::Borrowed(line.as_str())
            }
        })
    }
}

/// Scrollback plus the line being typed. Only the console's event loop owns
/// one of these.
pub struct Screen {
    prompt: String,
    scrollback: Vec<String>,
    pending: Vec<u8>,
    keys: KeyDecoder,
}

impl Screen {
    pub fn new(prompt: impl Into<String>) -> Self {
        Screen {
            prompt: prompt.into(),
            scrollback: Vec::new(),
            pending: Vec::new(),
            keys: KeyDecoder::new(),
        }
    }

    pub fn scrollback(&self) -> &[String] {
        &self.scrollback
    }

    pub fn pending(&self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }

    pub fn signature(&self) -> String {
        format!("{}> ", self.prompt)
    }

    /// Appends display text as-is, one scrollback entry per line.
    pub fn push_text(&mut self, text: &str) {
        self.scrollback.extend(text.lines().map(str::to_owned));
        if self.scrollback.len() > MAX_SCROLLBACK {
            let overflow = self.scrollback.len() - MAX_SCROLLBACK;
            self.scrollback.drain(..overflow);
        }
    }

    /// Feeds one stdin byte. Returns the command when the byte submitted a
    /// non-empty line; the line is echoed into the scrollback.
    pub fn handle_byte(&mut self, byte: u8) -> Option<String> {
        let key = self.keys.feed(byte)?;
        if !apply_key(key, &mut self.pending) {
            return None;
        }
        let command = self.pending();
        self.pending.clear();
        if command.trim().is_empty() {
            return None;
        }

        let echo = format!("{}{}", self.signature(), command).blue().to_string();
        self.push_text(&echo);
        Some(command)
    }

    /// Tail of the scrollback that fills `rows` terminal rows once long
    /// lines wrap at `width` columns. A line that only partly fits keeps its
    /// end.
    pub fn visible(&self, width: u16, rows: usize) -> Tail<'_> {
        let width = usize::from(width.max(1));
        let mut used = 0;
        let mut start = self.scrollback.len();
        let mut clipped_rows = 0;
        for line in self.scrollback.iter().rev() {
            if used == rows {
                break;
            }
            let needed = wrapped_rows(line, width);
            start -= 1;
            if used + needed > rows {
                clipped_rows = used + needed - rows;
                break;
            }
            used += needed;
        }
        Tail {
            lines: &self.scrollback[start..],
            clipped_rows,
        }
    }

    /// Full redraw: scrollback tail on top, prompt and pending input on the
    /// last row.
    pub fn render<W: Write>(&self, out: &mut W, (width, height): (u16, u16)) -> io::Result<()> {
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

        let rows = usize::from(height.saturating_sub(1));
        let mut row: u16 = 0;
        for line in self.visible(width, rows).printable(width) {
            queue!(out, MoveTo(0, row), Print(&line))?;
            let wrapped = wrapped_rows(&line, usize::from(width.max(1)));
            row = row.saturating_add(wrapped as u16);
        }

        queue!(
            out,
            MoveTo(0, height.saturating_sub(1)),
            Print(self.signature().bold()),
            Print(self.pending())
        )?;
        out.flush()
    }

    /// Content-only redraw used on the way out, after leaving the alternate
    /// screen. Nothing is cleared and no prompt is drawn.
    pub fn render_final<W: Write>(&self, out: &mut W, (width, height): (u16, u16)) -> io::Result<()> {
        let rows = usize::from(height.saturating_sub(1));
        for line in self.visible(width, rows).printable(width) {
            queue!(out, Print(&line), Print("\r\n"))?;
        }
        out.flush()
    }
}

fn wrapped_rows(line: &str, width: usize) -> usize {
    display_width(line).div_ceil(width).max(1)
}

// Drops the first `columns` printable characters. Escape sequences are kept so
// colors still apply to what is left.
fn drop_columns(line: &str, columns: usize) -> String {
    let mut kept = String::with_capacity(line.len());
    let mut dropped = 0;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            kept.push(c);
            if let Some(next) = chars.next() {
                kept.push(next);
                if next == '[' {
                    for c in chars.by_ref() {
                        kept.push(c);
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
            }
            continue;
        }
        if dropped < columns && !c.is_control() {
            dropped += 1;
            continue;
        }
        kept.push(c);
    }
    kept
}

// Printable width, skipping ANSI CSI sequences such as color codes.
fn display_width(line: &str) -> usize {
    let mut width = 0;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.next() == Some('[') {
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            continue;
        }
        if !c.is_control() {
            width += 1;
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(screen: &Screen, size: (u16, u16)) -> String {
        let mut out = Vec::new();
        screen.render(&mut out, size).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn display_text_is_split_into_lines() {
        let mut screen = Screen::new("rcon@test");
        screen.push_text("players: 2\r\nalice\nbob\n");
        assert_eq!(screen.scrollback(), ["players: 2", "alice", "bob"]);
    }

    #[test]
    fn submission_echoes_and_clears_pending() {
        let mut screen = Screen::new("rcon@test");
        for b in b"status" {
            assert_eq!(screen.handle_byte(*b), None);
        }
        assert_eq!(screen.pending(), "status");

        assert_eq!(screen.handle_byte(b'\r'), Some("status".to_owned()));
        assert_eq!(screen.pending(), "");
        assert_eq!(screen.scrollback().len(), 1);
        assert!(screen.scrollback()[0].contains("rcon@test> status"));
    }

    #[test]
    fn arrow_keys_do_not_reach_the_command() {
        let mut screen = Screen::new("rcon@test");
        for b in b"st\x1b[Aat\x1b[Dus" {
            assert_eq!(screen.handle_byte(*b), None);
        }
        assert_eq!(screen.pending(), "status");
        assert_eq!(screen.handle_byte(b'\r'), Some("status".to_owned()));
    }

    #[test]
    fn blank_submission_is_not_sent() {
        let mut screen = Screen::new("rcon@test");
        screen.handle_byte(b' ');
        assert_eq!(screen.handle_byte(b'\n'), None);
        assert!(screen.scrollback().is_empty());
        assert_eq!(screen.pending(), "");
    }

    #[test]
    fn visible_keeps_the_tail_that_fits() {
        let mut screen = Screen::new("p");
        for i in 0..10 {
            screen.push_text(&format!("line {i}"));
        }
        let visible = screen.visible(80, 3);
        assert_eq!(visible.lines, ["line 7", "line 8", "line 9"]);
        assert_eq!(visible.clipped_rows, 0);
    }

    #[test]
    fn visible_accounts_for_wrapping() {
        let mut screen = Screen::new("p");
        screen.push_text("short");
        screen.push_text(&"x".repeat(25));
        // 25 chars at width 10 take three rows
        assert_eq!(screen.visible(10, 3).lines, ["x".repeat(25)]);
        assert_eq!(screen.visible(10, 4).lines.len(), 2);
    }

    #[test]
    fn line_taller_than_the_pane_shows_its_end() {
        let mut screen = Screen::new("p");
        screen.push_text("older");
        screen.push_text(&format!("{}END", "x".repeat(47)));

        // 50 chars at width 10 need five rows, two are available
        let tail = screen.visible(10, 2);
        assert_eq!(tail.lines.len(), 1);
        assert_eq!(tail.clipped_rows, 3);
        let shown: Vec<String> = tail.printable(10).map(Cow::into_owned).collect();
        assert_eq!(shown, vec![format!("{}END", "x".repeat(17))]);

        let output = rendered(&screen, (10, 3));
        assert!(output.contains("xxxxxxxEND"));
        assert!(!output.contains("older"));
    }

    #[test]
    fn partly_visible_older_line_fills_the_top_row() {
        let mut screen = Screen::new("p");
        screen.push_text("abcdefghijklmnop");
        screen.push_text("new");

        let tail = screen.visible(10, 2);
        assert_eq!(tail.clipped_rows, 1);
        let shown: Vec<String> = tail.printable(10).map(Cow::into_owned).collect();
        assert_eq!(shown, vec!["klmnop".to_owned(), "new".to_owned()]);
    }

    #[test]
    fn clipping_keeps_color_codes() {
        let line = "abcdef".blue().to_string();
        let clipped = drop_columns(&line, 4);
        assert_eq!(display_width(&clipped), 2);
        assert!(clipped.starts_with('\x1b'));
        assert!(clipped.contains("ef"));
    }

    #[test]
    fn color_codes_do_not_count_towards_width() {
        assert_eq!(display_width(&"hello".green().to_string()), 5);
        assert_eq!(display_width("plain"), 5);
    }

    #[test]
    fn render_ends_with_prompt_and_pending_input() {
        let mut screen = Screen::new("rcon@localhost:7778");
        screen.push_text("hello from server");
        for b in b"say hi" {
            screen.handle_byte(*b);
        }

        let output = rendered(&screen, (80, 24));
        assert!(output.contains("hello from server"));
        assert!(output.contains("rcon@localhost:7778> "));
        assert!(output.ends_with("say hi"));
    }

    #[test]
    fn final_render_has_no_prompt() {
        let mut screen = Screen::new("rcon@test");
        screen.push_text("bye");
        let mut out = Vec::new();
        screen.render_final(&mut out, (80, 24)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "bye\r\n");
    }

    #[test]
    fn scrollback_is_capped() {
        let mut screen = Screen::new("p");
        for i in 0..MAX_SCROLLBACK + 5 {
            screen.push_text(&i.to_string());
        }
        assert_eq!(screen.scrollback().len(), MAX_SCROLLBACK);
        assert_eq!(screen.scrollback()[0], "5");
    }
}
