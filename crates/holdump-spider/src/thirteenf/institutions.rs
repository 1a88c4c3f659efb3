use super::records::InstitutionProfile;
use super::source::{Filer, FilingSource};
use super::store::FilingStore;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::{debug, error};

/// Discovery sweep: refresh `institution_profile` from the filers seen on the
/// form indexes over `years`.
///
/// Filers appear once per filing; the sweep collapses them to one profile per
/// CIK (first-seen name wins) before the upsert, so re-running never
/// duplicates an institution.
pub async fn sync_institutions<S, D>(
    source: &S,
    store: &D,
    form: &str,
    years: RangeInclusive<i32>,
    tui: bool,
) -> anyhow::Result<usize>
where
    S: FilingSource,
    D: FilingStore,
{
    let time = std::time::Instant::now();
    if tui {
        println!(
            "{bar}\n{name:^40}\n{bar}",
            bar = "=".repeat(40),
            name = "Institutions"
        );
    }

    debug!("sweeping {form} filers for {years:?}");
    let filers = source.recent_filers(form, years).await.map_err(|err| {
        error!("failed to sweep recent filers, error({err})");
        err
    })?;

    let mut profiles: BTreeMap<i64, InstitutionProfile> = BTreeMap::new();
    let updated_on = chrono::Utc::now();
    for filer in filers {
        let Filer { cik, name } = filer;
        profiles.entry(cik).or_insert(InstitutionProfile {
            cik,
            institution: name,
            updated_on,
        });
    }
    let profiles: Vec<InstitutionProfile> = profiles.into_values().collect();

    store.upsert_institutions(&profiles).await.map_err(|err| {
        error!("failed to upsert institution profiles, error({err})");
        err
    })?;

    debug!(
        "{} institution profiles refreshed. {}",
        profiles.len(),
        crate::time_elapsed(time)
    );
    if tui {
        println!("collecting institutions ... done\n");
    }

    Ok(profiles.len())
}
