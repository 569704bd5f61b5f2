//! One session's worth of loaded tables
//!
//! The catalog, ZIP directory and measurement table are read once and shared
//! read-only. Rankings are memoized on the engine until [`Dataset::reload`].

use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::config::DataArgs;
use crate::error::Result;
use crate::geography::{GeographyResolver, ResolvedDistrict, ZipDirectory};
use crate::ranking::{RankScope, RankingEngine};
use crate::report::{DistrictReport, ReportBuilder};
use crate::table::MeasurementTable;

pub struct Dataset {
    catalog: Arc<Catalog>,
    zips: ZipDirectory,
    engine: Arc<RankingEngine>,
    congress: u16,
}

impl Dataset {
    pub fn new(
        catalog: Catalog,
        zips: ZipDirectory,
        table: MeasurementTable,
        congress: u16,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            zips,
            engine: Arc::new(RankingEngine::new(Arc::new(table))),
            congress,
        }
    }

    pub fn load(args: &DataArgs) -> Result<Self> {
        info!("Loading variables from {:?}", args.variables_path());
        let catalog = Catalog::from_path(args.variables_path())?;
        info!("Loading ZIP mapping from {:?}", args.zip_map_path());
        let zips = ZipDirectory::from_path(args.zip_map_path())?;
        info!("Loading measurements from {:?}", args.measurements_path());
        let table = MeasurementTable::from_path(args.measurements_path())?;
        Ok(Self::new(catalog, zips, table, args.congress))
    }

    /// Re-read every input table; memoized rankings go with the old engine
    pub fn reload(&mut self, args: &DataArgs) -> Result<()> {
        *self = Self::load(args)?;
        Ok(())
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn engine(&self) -> &Arc<RankingEngine> {
        &self.engine
    }

    pub fn table(&self) -> &MeasurementTable {
        self.engine.table()
    }

    pub fn resolver(&self) -> GeographyResolver<'_> {
        GeographyResolver::new(&self.zips, self.engine.table(), self.congress)
    }

    /// Resolve a ZIP and build its report, nationally or within its own state
    pub fn report_for_zip(
        &self,
        zip: &str,
        state_scope: bool,
    ) -> Result<(ResolvedDistrict, DistrictReport)> {
        let resolved = self.resolver().resolve_zip(zip)?;
        let scope = if state_scope {
            RankScope::State(resolved.mapping.key.state_fips)
        } else {
            RankScope::National
        };
        let report =
            ReportBuilder::new(&self.catalog, &self.engine).build_scoped(resolved.row, scope)?;
        Ok((resolved, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankError;
    use crate::models::GeographyKey;

    const VARIABLES: &str = "\
Variable,Description,P_or_E,Category
V1PE,Percent!!EMPLOYMENT!!Percent unemployed,Percent,ECON
V2PE,Percent!!HOUSING!!Percent owner occupied,Percent,HOUSING
";
    const ZIPS: &str = "zip,state_fips,district\n00501,36,1\n10001,36,12\n90210,6,33\n";
    const MEASUREMENTS: &str = "\
NAME,V1PE,V2PE,state,congressional district
\"Congressional District 1 (115th Congress), New York\",4.5,70,36,01
\"Congressional District 12 (115th Congress), New York\",3.5,30,36,12
\"Congressional District 2 (115th Congress), California\",6.0,-888888888,06,02
";

    fn dataset() -> Dataset {
        Dataset::new(
            Catalog::from_reader(VARIABLES.as_bytes()).unwrap(),
            ZipDirectory::from_reader(ZIPS.as_bytes()).unwrap(),
            MeasurementTable::from_reader(MEASUREMENTS.as_bytes()).unwrap(),
            115,
        )
    }

    #[test]
    fn test_zip_report_end_to_end() {
        let data = dataset();
        let (resolved, report) = data.report_for_zip("501", false).unwrap();
        assert_eq!(resolved.mapping.zip, "00501");
        assert_eq!(report.key, Some(GeographyKey::new(36, 1)));
        assert_eq!(report.total_districts, 3);

        let ranks: Vec<(String, i64, i64)> =
            report.rows.iter().map(|r| (r.code.clone(), r.value, r.rank)).collect();
        // 4.5 rounds to 4 under ties-to-even
        assert_eq!(ranks, vec![("V1PE".to_string(), 4, 2), ("V2PE".to_string(), 70, 1)]);
    }

    #[test]
    fn test_state_scope_report() {
        let data = dataset();
        let (_, report) = data.report_for_zip("10001", true).unwrap();
        assert_eq!(report.scope, RankScope::State(36));
        assert_eq!(report.total_districts, 2);
        assert_eq!(report.rows[0].rank, 2);
    }

    #[test]
    fn test_zip_outcomes() {
        let data = dataset();
        assert!(matches!(data.report_for_zip("12345", false), Err(RankError::NotFound(_))));
        assert!(matches!(data.report_for_zip("9021O", false), Err(RankError::InvalidZipFormat(_))));
        assert!(matches!(
            data.report_for_zip("90210", false),
            Err(RankError::NoDataForDistrict(_))
        ));
    }

    #[test]
    fn test_sentinel_rows_stay_in_denominator() {
        let data = dataset();
        let ranked = data.engine().rank_column("V2PE", RankScope::National).unwrap();
        assert_eq!(ranked.population(), 3);
        let ca = data.resolver().resolve_label("CA-2").unwrap();
        assert_eq!(ranked.rank_of(ca), Some(3.0));
    }
}
