use sea_query::{ColumnDef, Expr as SeaExpr, Iden, Index, PostgresQueryBuilder, Query as SeaQuery, Table};
use sea_query_binder::SqlxBinder;
use sqlx::{Error as DbError, Row, postgres::PgRow};

use crate::{
    ChainError, Result,
    store::{
        DbCollection, PageData, data,
        db::postgres::{DbInit, DbRow},
        query,
    },
};

use super::{DbConnection, map_db_err};

#[derive(Debug)]
pub struct StepCollection {
    conn: DbConnection,
}

#[derive(Iden, Clone, Copy)]
#[iden = "exec_steps"]
enum CollectionIden {
    Table,

    Id,
    RecordId,
    ExecKey,
    Seq,
    NodeId,
    NodeName,
    Input,
    NodeData,
    Output,
    Status,
    Error,
    StartTime,
    EndTime,
}

const COLUMNS: [CollectionIden; 13] = [
    CollectionIden::Id,
    CollectionIden::RecordId,
    CollectionIden::ExecKey,
    CollectionIden::Seq,
    CollectionIden::NodeId,
    CollectionIden::NodeName,
    CollectionIden::Input,
    CollectionIden::NodeData,
    CollectionIden::Output,
    CollectionIden::Status,
    CollectionIden::Error,
    CollectionIden::StartTime,
    CollectionIden::EndTime,
];

impl DbCollection for StepCollection {
    type Item = data::ExecStep;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        super::exists(&self.conn, CollectionIden::Table, CollectionIden::Id, id)
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let (sql, values) = SeaQuery::select().from(CollectionIden::Table).columns(COLUMNS).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);

        match self.conn.query_optional(&sql, values).map_err(map_db_err)? {
            Some(row) => Self::Item::from_row(&row).map_err(map_db_err),
            None => Err(ChainError::Store(format!("step not found: {}", id))),
        }
    }

    fn query(
        &self,
        q: &query::Query,
    ) -> Result<PageData<Self::Item>> {
        super::query_page(&self.conn, CollectionIden::Table, CollectionIden::Id, &COLUMNS, q)
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let data = data.clone();
        let (sql, sql_values) = SeaQuery::insert()
            .into_table(CollectionIden::Table)
            .columns(COLUMNS)
            .values([
                data.id.into(),
                data.record_id.into(),
                data.exec_key.into(),
                data.seq.into(),
                data.node_id.into(),
                data.node_name.into(),
                data.input.into(),
                data.node_data.into(),
                data.output.into(),
                data.status.into(),
                data.error.into(),
                data.start_time.into(),
                data.end_time.into(),
            ])
            .map_err(map_db_err)?
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let model = data.clone();
        let (sql, sql_values) = SeaQuery::update()
            .table(CollectionIden::Table)
            .values([
                (CollectionIden::Output, model.output.into()),
                (CollectionIden::Status, model.status.into()),
                (CollectionIden::Error, model.error.into()),
                (CollectionIden::EndTime, model.end_time.into()),
            ])
            .and_where(SeaExpr::col(CollectionIden::Id).eq(data.id()))
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        super::delete(&self.conn, CollectionIden::Table, CollectionIden::Id, id)
    }
}

impl DbRow for data::ExecStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            record_id: row.try_get("record_id")?,
            exec_key: row.try_get("exec_key")?,
            seq: row.try_get("seq")?,
            node_id: row.try_get("node_id")?,
            node_name: row.try_get("node_name")?,
            input: row.try_get("input")?,
            node_data: row.try_get("node_data")?,
            output: row.try_get("output")?,
            status: row.try_get("status")?,
            error: row.try_get("error")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
        })
    }
}

impl DbInit for StepCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::RecordId).string().not_null())
                .col(ColumnDef::new(CollectionIden::ExecKey).string().not_null())
                .col(ColumnDef::new(CollectionIden::Seq).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::NodeId).string().not_null())
                .col(ColumnDef::new(CollectionIden::NodeName).string().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Input).text().not_null().default("{}"))
                .col(ColumnDef::new(CollectionIden::NodeData).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Output).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Status).string().not_null())
                .col(ColumnDef::new(CollectionIden::Error).text())
                .col(ColumnDef::new(CollectionIden::StartTime).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::EndTime).big_integer().not_null().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_exec_steps_exec_key").if_not_exists().table(CollectionIden::Table).col(CollectionIden::ExecKey).build(PostgresQueryBuilder),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl StepCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }
}
