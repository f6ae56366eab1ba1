pub struct Team {
    #[dbdef("type:bigserial; primary_key")]
    pub id: i64,
    #[dbdef("type:text; not_null; unique")]
    pub name: String,
    #[dbdef("type:timestamptz; not_null; default:now()")]
    pub created_at: DateTime<Utc>,
}
