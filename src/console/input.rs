/// What a single raw stdin byte means to the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Backspace,
    Submit,
    Escape,
    Printable(u8),
}

impl Key {
    pub fn classify(byte: u8) -> Self {
        match byte {
            127 | 8 => Key::Backspace, // DEL, BS
            13 | 10 => Key::Submit,    // CR, LF
            27 => Key::Escape,
            other => Key::Printable(other),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Escape {
    #[default]
    Idle,
    // ESC seen
    Started,
    // ESC [ params... final
    Csi,
    // ESC O final
    Ss3,
}

/// Turns raw stdin bytes into [Key]s. Escape sequences sent by arrow and
/// function keys are swallowed whole, since their bytes arrive one at a time.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    escape: Escape,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key a byte completes, if any.
    pub fn feed(&mut self, byte: u8) -> Option<Key> {
        match self.escape {
            Escape::Idle => match Key::classify(byte) {
                Key::Escape => {
                    self.escape = Escape::Started;
                    None
                }
                key => Some(key),
            },
            Escape::Started => match byte {
                b'[' => {
                    self.escape = Escape::Csi;
                    None
                }
                b'O' => {
                    self.escape = Escape::Ss3;
                    None
                }
                27 => None,
                // alt+key, keep the key
                _ => {
                    self.escape = Escape::Idle;
                    Some(Key::classify(byte))
                }
            },
            Escape::Csi => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = Escape::Idle;
                }
                None
            }
            Escape::Ss3 => {
                self.escape = Escape::Idle;
                None
            }
        }
    }
}

/// Applies one byte to the pending command line. Returns `true` when the
/// byte submits the line; the buffer is left untouched in that case so the
/// caller can take it.
pub fn construct_cmd_line(byte: u8, cmd_line: &mut Vec<u8>) -> bool {
    apply_key(Key::classify(byte), cmd_line)
}

/// [construct_cmd_line] for an already decoded key.
pub fn apply_key(key: Key, cmd_line: &mut Vec<u8>) -> bool {
    match key {
        Key::Backspace => {
            pop_char(cmd_line);
            false
        }
        Key::Submit => true,
        Key::Escape => false,
        Key::Printable(b) => {
            cmd_line.push(b);
            false
        }
    }
}

// Drops the last UTF-8 character, continuation bytes included.
fn pop_char(cmd_line: &mut Vec<u8>) {
    while let Some(last) = cmd_line.pop() {
        if last & 0b1100_0000 != 0b1000_0000 {
            break;
        }
    }
}
