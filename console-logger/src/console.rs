use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use std::io::{self, Write};

/// Print info on console.
pub fn info(message: &str) {
    println!("{}", Cyan.bold().italic().paint(message));
}

/// Print a progress message on console, without a trailing newline. The line is expected to be
/// completed later with [`done`] or [`newline`].
pub fn progress(message: &str) {
    print!("{}", Cyan.bold().italic().paint(message));
    let _ = io::stdout().flush();
}

/// Complete a progress line.
pub fn done(message: &str) {
    println!("{}", Green.bold().paint(message));
}

/// Terminate a pending progress line, e.g. before reporting a failure.
pub fn newline() {
    println!();
}

/// Print warning on console.
pub fn warn(message: &str, data: &str) {
    println!(
        "{} \n {} ",
        Yellow.bold().italic().paint(message),
        Red.bold().italic().paint(data)
    );
}

/// Print error on the standard error stream.
pub fn error(message: &str) {
    eprintln!("{}", Red.bold().paint(message));
}

/// Print a question on console and leave the cursor on the same line for the answer.
pub fn question(message: &str) {
    print!("{} ", Cyan.bold().paint(message));
    let _ = io::stdout().flush();
}
