//! Response records for the marketplace endpoints the jobs consume.
//!
//! Every field is optional or default-filled: the API omits keys freely and
//! mixes number/string encodings for identifiers and money. Only the fields
//! the jobs read are modelled.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

// ─── Lenient scalars ─────────────────────────────────────────────────────────

/// Deserializers accepting both JSON numbers and numeric strings.
mod lenient {
  use super::*;

  pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
      Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    })
  }

  pub fn num<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(d)? {
      Value::Number(n) => n.as_f64().unwrap_or(0.0),
      Value::String(s) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
      _ => 0.0,
    })
  }

  pub fn opt_num<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s.trim().replace(',', ".").parse().ok(),
      _ => None,
    })
  }

  pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
      Value::String(s) => s.trim().to_owned(),
      Value::Number(n) => n.to_string(),
      _ => String::new(),
    })
  }

  pub fn qty<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(id(d)?.unwrap_or(0))
  }

  pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
  }

  /// `null` reads as an empty list.
  pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
  where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
  {
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// `/v3/product/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductListResponse {
  pub result: ProductListResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductListResult {
  #[serde(deserialize_with = "lenient::list")]
  pub items:   Vec<ProductListItem>,
  #[serde(deserialize_with = "lenient::text")]
  pub last_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductListItem {
  #[serde(deserialize_with = "lenient::id")]
  pub product_id: Option<i64>,
  #[serde(deserialize_with = "lenient::text")]
  pub offer_id:   String,
  #[serde(deserialize_with = "lenient::flag")]
  pub archived:   bool,
}

/// `/v3/product/info/list`. Older API versions nest the items under
/// `result`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductInfoResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub items:  Vec<ProductInfo>,
  pub result: Option<ProductInfoItems>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductInfoItems {
  #[serde(deserialize_with = "lenient::list")]
  pub items: Vec<ProductInfo>,
}

impl ProductInfoResponse {
  pub fn into_items(self) -> Vec<ProductInfo> {
    match self.result {
      Some(r) if self.items.is_empty() => r.items,
      _ => self.items,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductInfo {
  #[serde(alias = "product_id", deserialize_with = "lenient::id")]
  pub id:            Option<i64>,
  #[serde(deserialize_with = "lenient::text")]
  pub offer_id:      String,
  #[serde(deserialize_with = "lenient::id")]
  pub sku:           Option<i64>,
  pub name:          Option<String>,
  pub created_at:    Option<String>,
  pub updated_at:    Option<String>,
  pub vat:           Option<String>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub volume_weight: Option<f64>,
  pub is_super:      Option<bool>,
  #[serde(deserialize_with = "lenient::list")]
  pub barcodes:      Vec<String>,
  /// A URL string or a list of URLs depending on the API version.
  pub primary_image: Value,
}

impl ProductInfo {
  pub fn first_barcode(&self) -> &str { self.barcodes.first().map(String::as_str).unwrap_or("") }

  pub fn primary_image_url(&self) -> &str {
    match &self.primary_image {
      Value::String(s) => s,
      Value::Array(a) => a.first().and_then(Value::as_str).unwrap_or(""),
      _ => "",
    }
  }
}

// ─── Stocks & prices ─────────────────────────────────────────────────────────

/// `/v4/product/info/stocks`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductStocksResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub items:  Vec<ProductStocks>,
  #[serde(deserialize_with = "lenient::text")]
  pub cursor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductStocks {
  #[serde(deserialize_with = "lenient::id")]
  pub product_id: Option<i64>,
  #[serde(deserialize_with = "lenient::text")]
  pub offer_id:   String,
  #[serde(deserialize_with = "lenient::list")]
  pub stocks:     Vec<StockEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StockEntry {
  /// `fbo` or `fbs`.
  #[serde(rename = "type", deserialize_with = "lenient::text")]
  pub kind:     String,
  #[serde(deserialize_with = "lenient::qty")]
  pub present:  i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub reserved: i64,
}

/// `/v5/product/info/prices`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductPricesResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub items:  Vec<ProductPrice>,
  #[serde(deserialize_with = "lenient::text")]
  pub cursor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductPrice {
  #[serde(deserialize_with = "lenient::id")]
  pub product_id:        Option<i64>,
  #[serde(deserialize_with = "lenient::num")]
  pub acquiring:         f64,
  pub commissions:       Commissions,
  pub price:             PriceBlock,
  pub price_indexes:     PriceIndexes,
  pub marketing_actions: MarketingActions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Commissions {
  #[serde(deserialize_with = "lenient::num")]
  pub sales_percent_fbo:                f64,
  #[serde(deserialize_with = "lenient::num")]
  pub sales_percent_fbs:                f64,
  #[serde(deserialize_with = "lenient::num")]
  pub fbo_direct_flow_trans_max_amount: f64,
  #[serde(deserialize_with = "lenient::num")]
  pub fbs_direct_flow_trans_max_amount: f64,
  #[serde(deserialize_with = "lenient::num")]
  pub fbo_deliv_to_customer_amount:     f64,
  #[serde(deserialize_with = "lenient::num")]
  pub fbs_deliv_to_customer_amount:     f64,
  #[serde(deserialize_with = "lenient::num")]
  pub fbo_return_flow_amount:           f64,
  #[serde(deserialize_with = "lenient::num")]
  pub fbs_return_flow_amount:           f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriceBlock {
  #[serde(deserialize_with = "lenient::flag")]
  pub auto_action_enabled:    bool,
  #[serde(deserialize_with = "lenient::num")]
  pub marketing_seller_price: f64,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub marketing_price:        Option<f64>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub old_price:              Option<f64>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub min_price:              Option<f64>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub price:                  Option<f64>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub net_price:              Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriceIndexes {
  pub color_index: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketingActions {
  #[serde(deserialize_with = "lenient::list")]
  pub actions: Vec<MarketingAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarketingAction {
  #[serde(deserialize_with = "lenient::text")]
  pub title: String,
}

// ─── Analytics stocks & clusters ─────────────────────────────────────────────

/// `/v1/analytics/stocks`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyticsStocksResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub items: Vec<AnalyticsStock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyticsStock {
  #[serde(deserialize_with = "lenient::text")]
  pub sku:                              String,
  /// Present only when the endpoint breaks results down per cluster.
  #[serde(deserialize_with = "lenient::id")]
  pub cluster_id:                       Option<i64>,
  #[serde(deserialize_with = "lenient::qty")]
  pub available_stock_count:            i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub other_stock_count:                i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub requested_stock_count:            i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub return_from_customer_stock_count: i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub return_to_seller_stock_count:     i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub stock_defect_stock_count:         i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub transit_defect_stock_count:       i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub transit_stock_count:              i64,
  #[serde(deserialize_with = "lenient::qty")]
  pub valid_stock_count:                i64,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub ads:                              Option<f64>,
  #[serde(deserialize_with = "lenient::id")]
  pub days_without_sales:               Option<i64>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub idc:                              Option<f64>,
  pub turnover_grade:                   Option<String>,
}

/// Cluster families accepted by `/v1/cluster/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterType {
  Ozon,
  Cis,
}

impl ClusterType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Ozon => "CLUSTER_TYPE_OZON",
      Self::Cis => "CLUSTER_TYPE_CIS",
    }
  }
}

/// `/v1/cluster/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterListResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub clusters: Vec<Cluster>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Cluster {
  #[serde(alias = "cluster_id", deserialize_with = "lenient::id")]
  pub id:                Option<i64>,
  #[serde(alias = "cluster_name", deserialize_with = "lenient::text")]
  pub name:              String,
  #[serde(rename = "type")]
  pub kind:              Option<String>,
  #[serde(deserialize_with = "lenient::list")]
  pub warehouses:        Vec<WarehouseRef>,
  #[serde(deserialize_with = "lenient::list")]
  pub logistic_clusters: Vec<LogisticCluster>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogisticCluster {
  #[serde(deserialize_with = "lenient::list")]
  pub warehouses: Vec<WarehouseRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WarehouseRef {
  #[serde(alias = "id", deserialize_with = "lenient::id")]
  pub warehouse_id: Option<i64>,
  #[serde(deserialize_with = "lenient::text")]
  pub name:         String,
}

impl Cluster {
  /// Warehouses listed directly on the cluster and under its logistic
  /// sub-clusters.
  pub fn all_warehouses(&self) -> impl Iterator<Item = &WarehouseRef> {
    self
      .warehouses
      .iter()
      .chain(self.logistic_clusters.iter().flat_map(|l| l.warehouses.iter()))
  }
}

/// `/v2/warehouse/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WarehouseListResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub result: Vec<WarehouseRef>,
}

// ─── Postings ────────────────────────────────────────────────────────────────

/// `/v2/posting/fbo/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FboPostingsResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub result: Vec<Posting>,
}

/// `/v3/posting/fbs/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FbsPostingsResponse {
  pub result: FbsPostingsResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FbsPostingsResult {
  #[serde(deserialize_with = "lenient::list")]
  pub postings: Vec<Posting>,
  #[serde(deserialize_with = "lenient::flag")]
  pub has_next: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Posting {
  #[serde(deserialize_with = "lenient::text")]
  pub posting_number: String,
  pub order_number:   Option<String>,
  pub status:         Option<String>,
  pub in_process_at:  Option<String>,
  pub created_at:     Option<String>,
  pub shipment_date:  Option<String>,
  #[serde(deserialize_with = "lenient::list")]
  pub products:       Vec<PostingProduct>,
  pub financial_data: Option<FinancialData>,
}

impl Posting {
  /// Creation time, falling back to when processing started.
  pub fn created(&self) -> Option<&str> {
    self.created_at.as_deref().or(self.in_process_at.as_deref()).filter(|s| !s.is_empty())
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FinancialData {
  pub cluster_to: Option<String>,
  #[serde(deserialize_with = "lenient::list")]
  pub products:   Vec<FinancialProduct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FinancialProduct {
  #[serde(deserialize_with = "lenient::opt_num")]
  pub price:   Option<f64>,
  /// A list of action names or a single string.
  pub actions: Value,
}

impl FinancialProduct {
  pub fn actions_text(&self) -> String {
    match &self.actions {
      Value::Array(a) => a.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", "),
      Value::String(s) => s.clone(),
      _ => String::new(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostingProduct {
  #[serde(deserialize_with = "lenient::id")]
  pub sku:      Option<i64>,
  #[serde(deserialize_with = "lenient::text")]
  pub offer_id: String,
  pub name:     Option<String>,
  #[serde(deserialize_with = "lenient::qty")]
  pub quantity: i64,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub price:    Option<f64>,
}

// ─── Returns ─────────────────────────────────────────────────────────────────

/// `/v1/returns/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReturnsResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub returns:  Vec<ReturnItem>,
  #[serde(deserialize_with = "lenient::flag")]
  pub has_next: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReturnItem {
  #[serde(alias = "return_id", deserialize_with = "lenient::id")]
  pub id:             Option<i64>,
  pub posting_number: Option<String>,
  #[serde(deserialize_with = "lenient::text")]
  pub offer_id:       String,
  #[serde(deserialize_with = "lenient::id")]
  pub sku:            Option<i64>,
  #[serde(deserialize_with = "lenient::qty")]
  pub quantity:       i64,
  pub status:         Option<String>,
  #[serde(alias = "return_reason_name")]
  pub reason:         Option<String>,
  #[serde(deserialize_with = "lenient::opt_num")]
  pub price:          Option<f64>,
  pub created_at:     Option<String>,
  /// Newer API versions nest the product fields.
  pub product:        Option<ReturnProduct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReturnProduct {
  #[serde(deserialize_with = "lenient::text")]
  pub offer_id: String,
  #[serde(deserialize_with = "lenient::id")]
  pub sku:      Option<i64>,
  #[serde(deserialize_with = "lenient::qty")]
  pub quantity: i64,
}

impl ReturnItem {
  /// Stable key for the returns report: the return id, else the posting.
  pub fn key(&self) -> Option<String> {
    self
      .id
      .map(|id| id.to_string())
      .or_else(|| self.posting_number.clone().filter(|p| !p.is_empty()))
  }

  pub fn offer(&self) -> &str {
    match &self.product {
      Some(p) if self.offer_id.is_empty() => &p.offer_id,
      _ => &self.offer_id,
    }
  }

  pub fn sku(&self) -> Option<i64> { self.sku.or(self.product.as_ref().and_then(|p| p.sku)) }

  pub fn qty(&self) -> i64 {
    match &self.product {
      Some(p) if self.quantity == 0 => p.quantity,
      _ => self.quantity,
    }
  }
}

// ─── Supply orders ───────────────────────────────────────────────────────────

/// `/v3/supply-order/list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupplyOrderListResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub order_ids: Vec<i64>,
  #[serde(deserialize_with = "lenient::text")]
  pub last_id:   String,
}

/// `/v3/supply-order/get`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupplyOrderGetResponse {
  #[serde(deserialize_with = "lenient::list")]
  pub orders: Vec<SupplyOrder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupplyOrder {
  #[serde(alias = "supply_order_id", alias = "order_id", deserialize_with = "lenient::id")]
  pub id:                   Option<i64>,
  #[serde(alias = "state", deserialize_with = "lenient::text")]
  pub status:               String,
  #[serde(deserialize_with = "lenient::list")]
  pub items:                Vec<SupplyItem>,
  #[serde(deserialize_with = "lenient::id")]
  pub storage_warehouse_id: Option<i64>,
  pub storage_warehouse:    Option<WarehouseRef>,
  pub created_at:           Option<String>,
  pub updated_at:           Option<String>,
  pub cluster_name:         Option<String>,
}

impl SupplyOrder {
  pub fn warehouse_id(&self) -> Option<i64> {
    self.storage_warehouse_id.or(self.storage_warehouse.as_ref().and_then(|w| w.warehouse_id))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupplyItem {
  #[serde(deserialize_with = "lenient::text")]
  pub sku:      String,
  #[serde(deserialize_with = "lenient::qty")]
  pub quantity: i64,
}

// ─── Generated reports ───────────────────────────────────────────────────────

/// `/v1/report/placement/by-products/create`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportCreateResponse {
  #[serde(deserialize_with = "lenient::text")]
  pub code: String,
}

/// `/v1/report/info`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportInfoResponse {
  pub result: ReportInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportInfo {
  #[serde(deserialize_with = "lenient::text")]
  pub code:   String,
  #[serde(deserialize_with = "lenient::text")]
  pub status: String,
  #[serde(deserialize_with = "lenient::text")]
  pub file:   String,
  #[serde(deserialize_with = "lenient::text")]
  pub error:  String,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn identifiers_accept_numbers_and_strings() {
    let item: ProductInfo = serde_json::from_value(json!({
      "id": "42",
      "sku": 1001,
      "volume_weight": "0,5",
      "primary_image": ["https://img/1.jpg", "https://img/2.jpg"],
      "barcodes": ["460"],
    }))
    .unwrap();
    assert_eq!(item.id, Some(42));
    assert_eq!(item.sku, Some(1001));
    assert_eq!(item.volume_weight, Some(0.5));
    assert_eq!(item.primary_image_url(), "https://img/1.jpg");
    assert_eq!(item.first_barcode(), "460");
  }

  #[test]
  fn missing_fields_default() {
    let resp: FbsPostingsResponse = serde_json::from_value(json!({})).unwrap();
    assert!(resp.result.postings.is_empty());
    assert!(!resp.result.has_next);

    let stock: AnalyticsStock = serde_json::from_value(json!({ "sku": 7 })).unwrap();
    assert_eq!(stock.sku, "7");
    assert_eq!(stock.cluster_id, None);
    assert_eq!(stock.available_stock_count, 0);
  }

  #[test]
  fn nested_product_info_items_are_found() {
    let resp: ProductInfoResponse =
      serde_json::from_value(json!({ "result": { "items": [{ "id": 1 }] } })).unwrap();
    assert_eq!(resp.into_items().len(), 1);
  }

  #[test]
  fn cluster_warehouses_include_logistic_clusters() {
    let c: Cluster = serde_json::from_value(json!({
      "id": 4,
      "name": "Москва",
      "logistic_clusters": [{ "warehouses": [{ "warehouse_id": 9, "name": "ХОРУГВИНО_РФЦ" }] }],
    }))
    .unwrap();
    assert_eq!(c.all_warehouses().map(|w| w.warehouse_id).collect::<Vec<_>>(), vec![Some(9)]);
  }

  #[test]
  fn posting_financials() {
    let p: Posting = serde_json::from_value(json!({
      "posting_number": "P-1",
      "in_process_at": "2024-05-01T10:00:00Z",
      "products": [{ "offer_id": "A", "quantity": 2, "price": "199.50" }],
      "financial_data": {
        "cluster_to": "Москва",
        "products": [{ "price": 180, "actions": ["Скидка", "Бонус"] }],
      },
    }))
    .unwrap();
    assert_eq!(p.created(), Some("2024-05-01T10:00:00Z"));
    assert_eq!(p.products[0].price, Some(199.5));
    let fin = p.financial_data.unwrap();
    assert_eq!(fin.cluster_to.as_deref(), Some("Москва"));
    assert_eq!(fin.products[0].actions_text(), "Скидка, Бонус");
  }

  #[test]
  fn return_item_falls_back_to_nested_product() {
    let r: ReturnItem = serde_json::from_value(json!({
      "id": 55,
      "product": { "offer_id": "A-1", "sku": 3, "quantity": 2 },
    }))
    .unwrap();
    assert_eq!(r.key().as_deref(), Some("55"));
    assert_eq!((r.offer(), r.sku(), r.qty()), ("A-1", Some(3), 2));
  }
}
