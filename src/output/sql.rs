//! SQL rendering: the full DDL script that recreates a realm from empty.

use crate::diff::diff_realms;
use crate::emit::emit_plan;
use crate::error::Result;
use crate::schema::Realm;

/// Render the realm as an executable DDL script. Statement order comes
/// from the realm differ against an empty realm, so referenced tables
/// appear before the foreign keys that point at them.
pub fn render(realm: &Realm) -> Result<String> {
    let changes = diff_realms(realm, &Realm::default())?;
    let universe = realm.tables.keys().cloned().collect();
    let plan = emit_plan(&changes, true, &universe)?;
    Ok(plan.up_script())
}
