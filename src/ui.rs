use std::io::{self, Write};

use colored::*;

use crate::conversation::Output;

/// Line-oriented console used by the conversation loop.
pub struct Console {
    colorful: bool,
}

impl Console {
    pub fn new(colorful: bool) -> Self {
        if !colorful {
            colored::control::set_override(false);
        }
        Self { colorful }
    }

    /// Print the input prompt without a trailing newline.
    pub fn prompt(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{} ", "User:".bright_green().bold())?;
        stdout.flush()
    }

    pub fn show(&self, output: &Output) {
        match output {
            Output::Assistant(text) => println!("{} {}", "AI:".bright_blue().bold(), text),
            Output::Raw(text) => println!("{} {}", "AI (raw):".dimmed(), text.dimmed()),
            Output::Observation(text) => {
                println!("{} {}", "Observation:".bright_black(), text)
            }
            Output::Notice(text) => {
                if self.colorful {
                    println!("{}", text.yellow());
                } else {
                    println!("! {}", text);
                }
            }
        }
    }
}
