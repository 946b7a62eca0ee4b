use crate::common::{
    constants::PRODUCT,
    error::{ReadUserInput, Result, UpgradeAborted},
};
use snafu::{ensure, ResultExt};
use std::io::BufRead;

/// Asked before anything in the cluster is changed.
pub(crate) const CONTINUE_QUESTION: &str = "Do you want to continue? (y/n)";

/// Message printed ahead of the confirmation question.
pub(crate) fn upgrade_notice(namespace: &str) -> String {
    format!("Preparing to upgrade {PRODUCT} in namespace \"{namespace}\".")
}

/// Asks the user to confirm the upgrade, and reads a line of input for the answer. Any answer
/// other than yes aborts the upgrade.
pub(crate) fn confirm<R>(namespace: &str, mut input: R) -> Result<()>
where
    R: BufRead,
{
    console_logger::info(upgrade_notice(namespace).as_str());
    console_logger::question(CONTINUE_QUESTION);

    let mut answer = String::new();
    input.read_line(&mut answer).context(ReadUserInput)?;

    ensure!(is_yes(answer.as_str()), UpgradeAborted);
    Ok(())
}

/// 'y' or 'yes', in any case.
fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
