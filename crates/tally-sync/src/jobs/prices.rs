//! Prices, commissions and logistics costs per product.

use tally_client::{Transport, records::ProductPrice};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};

use super::{JobOutput, ceil};
use crate::{Result, context::RunContext};

pub const CODE: &str = "price_logistics";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Цены и логистика", "Данные по ценам и логистике") }

const TEXT: &[&str] = &["IC", "ID", "IJ", "IK"];

/// Action titles hidden from `IK`/`IL` unless a config overrides the list.
pub const EXCLUDED_ACTIONS: &[&str] = &[
  "Рассрочка 0-0-6 на всё РФ товары",
  "WOW-БЭК_Кэшбэк на покупку Ozon Fashion списание 2.0",
  "ВАУ баллы 50% 9 волна 3-я волна (основная)",
  "Ozon Fashion + Jardin 500 вау баллов  списание",
  "Ozon Fashion + Jardin 1000 списание",
  "[Ozon Fashion + Jardin 10 000 списание",
  "Ozon Fashion + Jardin 10 000 списание",
  "Ozon Fashion + Jardin списание 1 млн",
  "Ozon Fashion + Jardin списание 1 млн вторая",
  "Ozon Fashion + Jardin_Запасная акция 500 вау баллов списание",
  "Ozon Fashion + Jardin_Запасная акция 1000 вау баллов списание",
  "Ozon Fashion + Jardin_Запасная акция 10 000 вау баллов списание",
  "Ozon x Ростикс / Вкусная игра Номинал ВАУ-баллов - 200, количество - 25 000 шт. списание",
  "Ozon x Ростикс / Вкусная игра Номинал ВАУ-баллов - 1000, количество - 15 500 шт. списание",
  "Ozon x Ростикс / Вкусная игра Номинал ВАУ-баллов - 100 000, количество - 10 шт. списание",
  "Ozon x Ростикс / Вкусная игра Номинал ВАУ-баллов - 1 000 000, количество - 1 шт. списание",
  "Промокоды для интеграции в НГ акцию от t2 // ВАУ-баллы списание 200",
  "Промокоды для интеграции в НГ акцию от t2 // ВАУ-баллы списание 500",
  "РК. Честная рассрочка 0-0-6",
  "РК. Честная рассрочка 0-0-12",
  "Товары со скидкой на платном хранении",
  "Рассрочка Беларусь для теста на 5% клиентов. Хайлайт Людвига",
  "РК.Рассрочка 0-0-12 до 31.01.2026",
  "Скидка 10% для сотрудников НГ товары + Книги",
  "РК.Рассрочка 0-0-6 до 31.01.3031",
  "Дополнительные промокоды для интеграции в НГ акцию от t2 // ВАУ-баллы 200 списание",
  "Дополнительные промокоды для интеграции в НГ акцию от t2 // ВАУ-баллы 500 списание",
  "Промокоды для интеграции в акцию \"Обмен минут и ГБ\" от t2 // ВАУ-баллы (бюджет коммерции) списание 100 баллов",
  "Промокоды для интеграции в акцию \"Обмен минут и ГБ\" от t2 // ВАУ-баллы (бюджет коммерции)  200 ВАУ-баллов х 100 000 шт списание",
  "Промокоды для интеграции в акцию \"Обмен минут и ГБ\" от t2 // ВАУ-баллы (бюджет коммерции)  500 ВАУ-баллов х 50 000 шт",
];

pub fn columns() -> Vec<Column> {
  let mut out = vec![Column::new("product_id", "Product ID", 10, DataType::Number)];
  let keys = [
    "HP", "HQ", "HR", "HS", "HT", "HU", "HV", "HW", "HX", "HY", "HZ", "IA", "IB", "IC", "ID", "IE",
    "IF", "IG", "IH", "II", "IJ", "IK", "IL", "IM",
  ];
  for (i, key) in keys.into_iter().enumerate() {
    let data_type = if TEXT.contains(&key) { DataType::Text } else { DataType::Number };
    out.push(Column::new(key, key, 20 + 10 * i as i64, data_type));
  }
  out
}

/// Display label of a price colour index. Unknown values pass through.
pub fn color_label(index: &str) -> &str {
  match index {
    "WITHOUT_INDEX" => "НЕТ",
    "GREEN" => "ХОРОШИЙ",
    "YELLOW" => "СРЕДНИЙ",
    "RED" => "ПЛОХОЙ",
    other => other,
  }
}

/// Commission amount on the marketing seller price, zero when either input is.
fn commission(price: f64, percent: f64) -> i64 {
  if price == 0.0 || percent == 0.0 { 0 } else { ceil(price * percent / 100.0) }
}

pub fn price_patch(item: &ProductPrice, excluded_actions: &[String]) -> RowPatch {
  let c = &item.commissions;
  let p = &item.price;
  let msp = p.marketing_seller_price;

  let fbo_fee = commission(msp, c.sales_percent_fbo);
  let fbs_fee = commission(msp, c.sales_percent_fbs);
  let fbo_trans = ceil(c.fbo_direct_flow_trans_max_amount);
  let fbs_trans = ceil(c.fbs_direct_flow_trans_max_amount);
  let fbo_deliv = ceil(c.fbo_deliv_to_customer_amount);
  let fbs_deliv = ceil(c.fbs_deliv_to_customer_amount);
  let fbo_total = ceil(item.acquiring + (fbo_fee + fbo_trans + fbo_deliv) as f64);
  let fbs_total = ceil(item.acquiring + (fbs_trans + fbs_deliv + fbs_fee) as f64);

  let actions: Vec<String> = item
    .marketing_actions
    .actions
    .iter()
    .map(|a| a.title.trim())
    .filter(|t| !t.is_empty() && !excluded_actions.iter().any(|x| x == t))
    .map(|t| format!("[{t}]"))
    .collect();

  let color = item.price_indexes.color_index.as_deref().map(color_label);

  RowPatch::new()
    .with("product_id", item.product_id)
    .with("HP", ceil(item.acquiring))
    .with("HQ", ceil(c.sales_percent_fbo))
    .with("HR", fbo_fee)
    .with("HS", fbo_trans)
    .with("HT", fbo_deliv)
    .with("HU", c.fbo_return_flow_amount)
    .with("HV", ceil(c.sales_percent_fbs))
    .with("HW", fbs_fee)
    .with("HX", fbs_trans)
    .with("HY", fbs_deliv)
    .with("HZ", c.fbs_return_flow_amount)
    .with("IA", fbo_total)
    .with("IB", fbs_total)
    .with("IC", "")
    .with("ID", if p.auto_action_enabled { "🔥" } else { "🔕" })
    .with("IE", p.old_price)
    .with("IF", p.min_price)
    .with("IG", p.price)
    .with("IH", ceil(msp))
    .with("II", p.marketing_price)
    .with("IJ", color)
    .with("IK", actions.join(" "))
    .with("IL", actions.len())
    .with("IM", p.net_price)
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let catalog = ctx.catalog().await?;
  let ids = catalog.product_ids();
  let items = ctx.client.product_prices(&ids, &ctx.settings.batching(ctx.settings.pools.prices)).await?;

  let mut rows = RowUpdates::new();
  for item in &items {
    if let Some(pid) = item.product_id {
      rows.insert(pid.to_string(), price_patch(item, &ctx.settings.excluded_actions));
    }
  }
  Ok(JobOutput::written(ctx.write(meta(), &columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::{Value, json};

  use super::*;

  fn item() -> ProductPrice {
    serde_json::from_value(json!({
      "product_id": 101,
      "acquiring": 12.4,
      "commissions": {
        "sales_percent_fbo": 15,
        "sales_percent_fbs": 17.5,
        "fbo_direct_flow_trans_max_amount": 30.2,
        "fbs_direct_flow_trans_max_amount": 40,
        "fbo_deliv_to_customer_amount": 25.1,
        "fbs_deliv_to_customer_amount": 25,
        "fbo_return_flow_amount": 11.5,
        "fbs_return_flow_amount": 13,
      },
      "price": {
        "auto_action_enabled": true,
        "marketing_seller_price": 999.5,
        "price": "1100",
        "old_price": "1500",
        "net_price": null,
      },
      "price_indexes": { "color_index": "YELLOW" },
      "marketing_actions": { "actions": [
        { "title": "Распродажа" },
        { "title": " Скрытая " },
        { "title": "" },
      ]},
    }))
    .unwrap()
  }

  #[test]
  fn fees_and_totals() {
    let p = price_patch(&item(), &[]);
    // ceil(999.5 * 15 / 100) = ceil(149.925)
    assert_eq!(p.data["HR"], json!(150));
    // ceil(999.5 * 17.5 / 100) = ceil(174.9125)
    assert_eq!(p.data["HW"], json!(175));
    assert_eq!(p.data["HP"], json!(13));
    assert_eq!(p.data["HS"], json!(31));
    assert_eq!(p.data["HT"], json!(26));
    // ceil(12.4 + 150 + 31 + 26)
    assert_eq!(p.data["IA"], json!(220));
    // ceil(12.4 + 40 + 25 + 175)
    assert_eq!(p.data["IB"], json!(253));
    assert_eq!(p.data["IH"], json!(1000));
    assert_eq!(p.data["HU"], json!(11.5));
  }

  #[test]
  fn labels_and_actions() {
    let p = price_patch(&item(), &["Скрытая".to_string()]);
    assert_eq!(p.data["ID"], json!("🔥"));
    assert_eq!(p.data["IJ"], json!("СРЕДНИЙ"));
    assert_eq!(p.data["IK"], json!("[Распродажа]"));
    assert_eq!(p.data["IL"], json!(1));
    assert_eq!(p.data["IM"], Value::Null);
    assert_eq!(p.data["IG"], json!(1100.0));

    let all = price_patch(&item(), &[]);
    assert_eq!(all.data["IK"], json!("[Распродажа] [Скрытая]"));
  }

  #[test]
  fn default_exclusions_hide_write_off_actions() {
    let mut it = item();
    it.marketing_actions.actions[1].title = "РК. Честная рассрочка 0-0-6".into();
    let defaults = crate::SyncSettings::default().excluded_actions;
    let p = price_patch(&it, &defaults);
    assert_eq!(p.data["IK"], json!("[Распродажа]"));
    assert_eq!(p.data["IL"], json!(1));
    assert!(defaults.iter().any(|t| t == "Товары со скидкой на платном хранении"));
  }

  #[test]
  fn zero_price_means_zero_fee() {
    assert_eq!(commission(0.0, 15.0), 0);
    assert_eq!(commission(100.0, 0.0), 0);
    assert_eq!(color_label("PURPLE"), "PURPLE");
  }

  #[test]
  fn schema_types() {
    let cols = columns();
    assert_eq!(cols.len(), 25);
    assert!(cols.iter().any(|c| c.key == "IK" && c.data_type == DataType::Text));
    assert!(cols.iter().any(|c| c.key == "IM" && c.data_type == DataType::Number));
  }
}
