//! Directory of logistics clusters, domestic and CIS.

use tally_client::{
  Transport,
  records::{Cluster, ClusterType},
};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};

use super::JobOutput;
use crate::{Result, context::RunContext};

pub const CODE: &str = "clusters";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Кластеры", "Список кластеров Ozon") }

pub fn columns() -> Vec<Column> {
  vec![
    Column::new("cluster_id", "ID", 10, DataType::Number),
    Column::new("name", "Название", 20, DataType::Text),
    Column::new("type", "Тип", 30, DataType::Text),
  ]
}

/// One row per cluster id. A cluster without its own type takes the type of
/// the list it came from.
pub fn cluster_rows(lists: &[(ClusterType, Vec<Cluster>)]) -> RowUpdates {
  let mut rows = RowUpdates::new();
  for (kind, clusters) in lists {
    for c in clusters {
      let Some(id) = c.id else { continue };
      let kind = c.kind.as_deref().filter(|k| !k.is_empty()).unwrap_or(kind.as_str());
      rows.insert(
        id.to_string(),
        RowPatch::new().with("cluster_id", id).with("name", c.name.as_str()).with("type", kind),
      );
    }
  }
  rows
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let mut lists = Vec::new();
  for kind in [ClusterType::Ozon, ClusterType::Cis] {
    lists.push((kind, ctx.client.clusters(kind).await?));
  }
  Ok(JobOutput::written(ctx.write(meta(), &columns(), cluster_rows(&lists)).await?))
}
