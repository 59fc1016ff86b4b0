mod record;
mod step;
mod workflow;

use std::sync::Arc;

use sea_query::{
    Alias as SeaAlias, Condition, Expr as SeaExpr, Func as SeaFunc, Iden, Order as SeaOrder, PostgresQueryBuilder, Query as SeaQuery, Value as SeaValue,
};
use sea_query_binder::SqlxBinder;
use serde_json::Value;
use sqlx::Row;

use crate::{
    Result,
    store::{PageData, db::postgres::DbRow, query::Query},
};

use super::synclient::SynClient;

pub(crate) use crate::store::map_db_err;
pub use record::RecordCollection;
pub use step::StepCollection;
pub use workflow::WorkflowCollection;

pub type DbConnection = Arc<SynClient>;

/// Equality filters of a [`Query`] as a sea-query condition.
pub fn into_query(q: &Query) -> Condition {
    q.filters().iter().fold(Condition::all(), |cond, (key, value)| {
        let col = SeaExpr::col(SeaAlias::new(key));
        match value {
            Value::Null => cond.add(col.is_null()),
            Value::Bool(b) => cond.add(col.eq(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => cond.add(col.eq(i)),
                None => cond.add(col.eq(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => cond.add(col.eq(s.as_str())),
            other => cond.add(col.eq(SeaValue::from(other.to_string()))),
        }
    })
}

/// Count and fetch one page of `table`.
pub fn query_page<T, I>(
    conn: &DbConnection,
    table: I,
    id: I,
    columns: &[I],
    q: &Query,
) -> Result<PageData<T>>
where
    T: DbRow,
    I: Iden + Copy + 'static,
{
    let filter = into_query(q);

    let mut count_query = SeaQuery::select();
    count_query.from(table).expr(SeaFunc::count(SeaExpr::col(id)));

    let mut query = SeaQuery::select();
    query.columns(columns.iter().copied()).from(table);

    if !filter.is_empty() {
        count_query.cond_where(filter.clone());
        query.cond_where(filter);
    }

    for (order, rev) in q.order_by().iter() {
        query.order_by(
            SeaAlias::new(order),
            if *rev {
                SeaOrder::Desc
            } else {
                SeaOrder::Asc
            },
        );
    }
    let (sql, values) = query.limit(q.limit() as u64).offset(q.offset() as u64).build_sqlx(PostgresQueryBuilder);

    let (count_sql, count_values) = count_query.build_sqlx(PostgresQueryBuilder);
    let count = conn.query_one(count_sql.as_str(), count_values).map_err(map_db_err)?.get::<i64, usize>(0) as usize;
    let rows = conn.query(&sql, values).map_err(map_db_err)?.iter().map(T::from_row).collect::<std::result::Result<Vec<_>, _>>().map_err(map_db_err)?;

    Ok(PageData::paged(count, q, rows))
}

/// Whether a row with `id` exists in `table`.
pub fn exists<I>(
    conn: &DbConnection,
    table: I,
    id_col: I,
    id: &str,
) -> Result<bool>
where
    I: Iden + Copy + 'static,
{
    let (sql, values) = SeaQuery::select().from(table).expr(SeaFunc::count(SeaExpr::col(id_col))).and_where(SeaExpr::col(id_col).eq(id)).build_sqlx(PostgresQueryBuilder);

    let count = conn.query_one(sql.as_str(), values).map(|row| row.get::<i64, usize>(0)).map_err(map_db_err)?;
    Ok(count > 0)
}

/// Delete the row with `id` from `table`.
pub fn delete<I>(
    conn: &DbConnection,
    table: I,
    id_col: I,
    id: &str,
) -> Result<bool>
where
    I: Iden + Copy + 'static,
{
    let (sql, values) = SeaQuery::delete().from_table(table).and_where(SeaExpr::col(id_col).eq(id)).build_sqlx(PostgresQueryBuilder);

    let result = conn.execute(sql.as_str(), values).map_err(map_db_err)?;
    Ok(result.rows_affected() > 0)
}
