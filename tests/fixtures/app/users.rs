pub struct User {
    #[dbdef("index:idx_users_team_id,team_id")]
    _table: (),
    #[dbdef("type:bigserial; primary_key")]
    pub id: i64,
    #[dbdef("type:text; not_null; unique")]
    pub email: String,
    #[db("display_name")]
    #[dbdef("type:text")]
    pub name: Option<String>,
    #[dbdef("type:bigint; foreign_key:teams.id; on_delete:set null")]
    pub team_id: Option<i64>,
    #[dbdef("type:boolean; not_null; default:true")]
    pub is_active: bool,
    #[db("-")]
    pub session_token: String,
}
