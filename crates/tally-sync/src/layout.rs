//! Schema of the canonical `monitor` report.
//!
//! Only columns some job or the merge actually fills are declared. Keys
//! without a human label are labelled with their own letters.

use tally_core::{
  Result,
  colkey::{col_order, col_range},
  report::{Column, DataType, ReportMeta},
};

pub const CATALOG_CODE: &str = "monitor";

pub fn monitor_meta() -> ReportMeta { ReportMeta::new(CATALOG_CODE, "Монитор", "Главная таблица Ozon") }

const LABELLED: &[(&str, &str, DataType)] = &[
  ("A", "Картинка", DataType::Text),
  ("B", "Артикул", DataType::Text),
  ("C", "Наименование", DataType::Text),
  ("D", "Super", DataType::Text),
  ("K", "SKU", DataType::Text),
  ("L", "Product ID", DataType::Number),
  ("M", "Штрихкод", DataType::Text),
  ("N", "Дата создания", DataType::Date),
  ("O", "Дата обновл.", DataType::Date),
  ("P", "НДС", DataType::Text),
  ("Y", "Объем вес", DataType::Number),
  ("BL", "FBS в наличии", DataType::Number),
  ("BM", "Резерв общий", DataType::Number),
  ("BN", "Резерв FBO", DataType::Number),
  ("BO", "Резерв FBS", DataType::Number),
  ("DK", "Хранение: стоимость", DataType::Number),
  ("DL", "Хранение: платные шт.", DataType::Number),
  ("DM", "Хранение: прогноз 28д", DataType::Number),
  ("DN", "Хранение: складов", DataType::Number),
  ("HH", "FBO прошлый год (1)", DataType::Number),
  ("HI", "FBS прошлый год (1)", DataType::Number),
  ("HJ", "FBO прошлый год (2)", DataType::Number),
  ("HK", "FBS прошлый год (2)", DataType::Number),
  ("HL", "FBO прошлый год (3)", DataType::Number),
  ("HM", "FBS прошлый год (3)", DataType::Number),
  ("HN", "FBS прошлый год (сумма)", DataType::Number),
  ("JG", "Дата обновл. (дубль)", DataType::Date),
];

/// Grade columns inside the per-cluster blocks hold text.
const CLUSTER_TEXT: &[&str] = &["CG", "CK", "CO", "CS", "CW", "DA", "DE", "DI"];

/// Cluster-stock columns not written by any job.
const CLUSTER_UNOWNED: &[&str] = &["AL", "BG", "BH", "BI", "BJ", "BK", "BQ", "BR", "BS", "BT", "BU", "BV", "CC"];

fn typed(keys: Vec<String>, data_type: DataType) -> Result<Vec<Column>> {
  keys
    .into_iter()
    .map(|k| Ok(Column::new(k.clone(), k.clone(), col_order(&k)?, data_type)))
    .collect()
}

/// Every column of the canonical report.
pub fn monitor_columns() -> Result<Vec<Column>> {
  let mut out = Vec::new();
  for (key, label, data_type) in LABELLED {
    out.push(Column::new(*key, *label, col_order(key)?, *data_type));
  }

  for key in col_range("AC", "DI")? {
    if LABELLED.iter().any(|(k, ..)| *k == key) || CLUSTER_UNOWNED.contains(&key.as_str()) {
      continue;
    }
    let data_type = match key.as_str() {
      "BW" | "BX" | "BY" | "BZ" | "CA" | "CB" => DataType::Text,
      k if CLUSTER_TEXT.contains(&k) => DataType::Text,
      _ => DataType::Number,
    };
    out.push(Column::new(key.clone(), key.clone(), col_order(&key)?, data_type));
  }

  out.extend(typed(col_range("DS", "ET")?, DataType::Number)?);
  out.extend(typed(col_range("EV", "FW")?, DataType::Number)?);
  out.extend(typed(col_range("FY", "GM")?, DataType::Number)?);
  out.extend(typed(col_range("GO", "GW")?, DataType::Number)?);
  out.extend(typed(col_range("HP", "IM")?, DataType::Text)?);
  Ok(out)
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  fn find<'a>(cols: &'a [Column], key: &str) -> &'a Column {
    cols.iter().find(|c| c.key == key).unwrap()
  }

  #[test]
  fn keys_are_unique() {
    let cols = monitor_columns().unwrap();
    let keys: HashSet<_> = cols.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys.len(), cols.len());
  }

  #[test]
  fn types_follow_the_blocks() {
    let cols = monitor_columns().unwrap();
    assert_eq!(find(&cols, "L").data_type, DataType::Number);
    assert_eq!(find(&cols, "N").data_type, DataType::Date);
    assert_eq!(find(&cols, "AM").data_type, DataType::Number);
    assert_eq!(find(&cols, "CK").data_type, DataType::Text);
    assert_eq!(find(&cols, "BW").data_type, DataType::Text);
    assert_eq!(find(&cols, "GK").data_type, DataType::Number);
    assert_eq!(find(&cols, "IJ").data_type, DataType::Text);
    assert_eq!(find(&cols, "B").label, "Артикул");
    assert!(!cols.iter().any(|c| c.key == "AL"));
  }

  #[test]
  fn order_follows_letters() {
    let cols = monitor_columns().unwrap();
    assert!(find(&cols, "A").order < find(&cols, "B").order);
    assert!(find(&cols, "ET").order < find(&cols, "EV").order);
  }
}
