/// SEC dates arrive as `YYYY-MM-DD` strings.
pub(crate) fn convert_date_type(date: &str) -> anyhow::Result<chrono::NaiveDate> {
    Ok(chrono::NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")?)
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////
