//! Column-key namespace helpers.
//!
//! Canonical column keys are spreadsheet-style letters (`A`, `Z`, `AA`, `JG`).
//! They are opaque identifiers to the store; these helpers convert between
//! letters and zero-based indices and derive a stable display order.

use crate::{Error, Result};

/// `"A"` → 0, `"Z"` → 25, `"AA"` → 26.
pub fn col_to_index(col: &str) -> Result<usize> {
  let col = col.trim();
  if col.is_empty() {
    return Err(Error::BadColumn(col.to_owned()));
  }
  let mut n: usize = 0;
  for ch in col.chars() {
    let up = ch.to_ascii_uppercase();
    if !up.is_ascii_uppercase() {
      return Err(Error::BadColumn(col.to_owned()));
    }
    n = n
      .checked_mul(26)
      .and_then(|n| n.checked_add((up as u8 - b'A' + 1) as usize))
      .ok_or_else(|| Error::BadColumn(col.to_owned()))?;
  }
  Ok(n - 1)
}

/// 0 → `"A"`, 25 → `"Z"`, 26 → `"AA"`.
pub fn index_to_col(idx: usize) -> String {
  let mut n = idx + 1;
  let mut out = Vec::new();
  while n > 0 {
    let rem = (n - 1) % 26;
    out.push(b'A' + rem as u8);
    n = (n - 1) / 26;
  }
  out.reverse();
  String::from_utf8_lossy(&out).into_owned()
}

/// Inclusive letter range: `col_range("DS", "DU")` → `["DS", "DT", "DU"]`.
pub fn col_range(start: &str, end: &str) -> Result<Vec<String>> {
  let a = col_to_index(start)?;
  let b = col_to_index(end)?;
  if b < a {
    return Err(Error::BadColumn(format!("{start}:{end}")));
  }
  Ok((a..=b).map(index_to_col).collect())
}

/// `count` consecutive letters starting at `start`.
pub fn col_span(start: &str, count: usize) -> Result<Vec<String>> {
  let a = col_to_index(start)?;
  Ok((a..a + count).map(index_to_col).collect())
}

/// Display order for a canonical column: spaced by ten so that derived
/// columns can be slotted in between.
pub fn col_order(col: &str) -> Result<i64> {
  Ok((col_to_index(col)? as i64 + 1) * 10)
}

/// Shift a column letter by `by` positions.
pub fn col_offset(col: &str, by: usize) -> Result<String> {
  Ok(index_to_col(col_to_index(col)? + by))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn letters_to_indices() {
    assert_eq!(col_to_index("A").unwrap(), 0);
    assert_eq!(col_to_index("Z").unwrap(), 25);
    assert_eq!(col_to_index("AA").unwrap(), 26);
    assert_eq!(col_to_index("jg").unwrap(), 266);
  }

  #[test]
  fn indices_to_letters() {
    assert_eq!(index_to_col(0), "A");
    assert_eq!(index_to_col(25), "Z");
    assert_eq!(index_to_col(26), "AA");
    assert_eq!(index_to_col(701), "ZZ");
    assert_eq!(index_to_col(702), "AAA");
  }

  #[test]
  fn conversion_is_inverse_over_used_range() {
    for i in 0..1000 {
      assert_eq!(col_to_index(&index_to_col(i)).unwrap(), i);
    }
  }

  #[test]
  fn rejects_garbage() {
    assert!(col_to_index("").is_err());
    assert!(col_to_index("A1").is_err());
    assert!(col_to_index("__row3__").is_err());
    assert!(col_range("B", "A").is_err());
  }

  #[test]
  fn daily_block_is_28_wide() {
    let fbo = col_span("DS", 28).unwrap();
    assert_eq!(fbo.first().map(String::as_str), Some("DS"));
    assert_eq!(fbo.last().map(String::as_str), Some("ET"));
    let fbs = col_span("EV", 28).unwrap();
    assert_eq!(fbs.last().map(String::as_str), Some("FW"));
  }

  #[test]
  fn order_is_monotonic() {
    assert_eq!(col_order("A").unwrap(), 10);
    assert!(col_order("AZ").unwrap() < col_order("BA").unwrap());
    assert_eq!(col_offset("AM", 19).unwrap(), "BF");
  }
}
