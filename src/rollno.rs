//! Roll numbers are derived from a student's national id, program and the
//! year of registration: `<program chars 2..4><yy><national id chars 9..11>`.
//!
//! Generation never fails. Short or malformed input yields a shorter code,
//! and an empty national id yields no code at all. Uniqueness is checked
//! separately by [`ensure_available`].

use crate::err::Error;

/// Length the management screen cuts generated codes down to.
pub const TRUNCATED_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollFormat {
    /// Registration screen, the code is kept whole.
    Full,
    /// Management screen, the code is cut to [`TRUNCATED_LEN`] characters.
    Truncated,
}

/// Characters `start..end` of `s`, clamped to the string's length.
fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

pub fn generate(national_id: &str, program: &str, year: i32, format: RollFormat) -> String {
    if national_id.is_empty() {
        return String::new();
    }

    let id_suffix = char_slice(national_id, 9, 11);
    let year_suffix = format!("{:02}", year.rem_euclid(100));
    let program_code = char_slice(program, 2, 4).to_uppercase();

    let code = format!("{}{}{}", program_code, year_suffix, id_suffix);
    match format {
        RollFormat::Full => code,
        RollFormat::Truncated => code.chars().take(TRUNCATED_LEN).collect(),
    }
}

/// Rejects `candidate` when another student already holds it.
///
/// `taken` is the holder of the code, if any; `owner` is the student being
/// edited, which may keep its own code.
pub fn ensure_available(
    candidate: &str,
    taken: Option<uuid::Uuid>,
    owner: Option<uuid::Uuid>,
) -> Result<(), Error> {
    if candidate.is_empty() {
        return Ok(());
    }
    match taken {
        Some(holder) if Some(holder) != owner => Err(Error::conflict(format!(
            "Roll number `{}` already exists",
            candidate
        ))),
        _ => Ok(()),
    }
}
