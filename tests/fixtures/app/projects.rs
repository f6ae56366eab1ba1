pub struct Project {
    #[dbdef("table:projects; unique:uk_projects_team_name,team_id,name where:is_active = true")]
    _table: (),
    #[dbdef("type:bigserial; primary_key")]
    pub id: i64,
    #[dbdef("type:bigint; not_null; foreign_key:teams.id; on_delete:cascade")]
    pub team_id: i64,
    #[dbdef("type:text; not_null")]
    pub name: String,
    #[dbdef("type:boolean; not_null; default:true")]
    pub is_active: bool,
}
