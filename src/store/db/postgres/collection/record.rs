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
pub struct RecordCollection {
    conn: DbConnection,
}

#[derive(Iden, Clone, Copy)]
#[iden = "exec_records"]
enum CollectionIden {
    Table,

    Id,
    ExecKey,
    WorkflowId,
    Title,
    Input,
    Output,
    WorkflowJson,
    Status,
    Error,
    StartTime,
    EndTime,
    CreatedBy,
    Suspend,
    Timestamp,
}

const COLUMNS: [CollectionIden; 14] = [
    CollectionIden::Id,
    CollectionIden::ExecKey,
    CollectionIden::WorkflowId,
    CollectionIden::Title,
    CollectionIden::Input,
    CollectionIden::Output,
    CollectionIden::WorkflowJson,
    CollectionIden::Status,
    CollectionIden::Error,
    CollectionIden::StartTime,
    CollectionIden::EndTime,
    CollectionIden::CreatedBy,
    CollectionIden::Suspend,
    CollectionIden::Timestamp,
];

impl DbCollection for RecordCollection {
    type Item = data::ExecRecord;

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
            None => Err(ChainError::NotFound(id.to_string())),
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
                data.exec_key.into(),
                data.workflow_id.into(),
                data.title.into(),
                data.input.into(),
                data.output.into(),
                data.workflow_json.into(),
                data.status.into(),
                data.error.into(),
                data.start_time.into(),
                data.end_time.into(),
                data.created_by.into(),
                data.suspend.into(),
                data.timestamp.into(),
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
                (CollectionIden::Suspend, model.suspend.into()),
                (CollectionIden::Timestamp, model.timestamp.into()),
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

impl DbRow for data::ExecRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            exec_key: row.try_get("exec_key")?,
            workflow_id: row.try_get("workflow_id")?,
            title: row.try_get("title")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            workflow_json: row.try_get("workflow_json")?,
            status: row.try_get("status")?,
            error: row.try_get("error")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            created_by: row.try_get("created_by")?,
            suspend: row.try_get("suspend")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl DbInit for RecordCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::ExecKey).string().not_null().unique_key())
                .col(ColumnDef::new(CollectionIden::WorkflowId).string().not_null())
                .col(ColumnDef::new(CollectionIden::Title).string().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Input).text().not_null().default("{}"))
                .col(ColumnDef::new(CollectionIden::Output).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::WorkflowJson).text().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Status).string().not_null())
                .col(ColumnDef::new(CollectionIden::Error).text())
                .col(ColumnDef::new(CollectionIden::StartTime).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::EndTime).big_integer().not_null().default(0))
                .col(ColumnDef::new(CollectionIden::CreatedBy).string().not_null().default(""))
                .col(ColumnDef::new(CollectionIden::Suspend).text())
                .col(ColumnDef::new(CollectionIden::Timestamp).big_integer().not_null().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_exec_records_status").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Status).build(PostgresQueryBuilder),
            Index::create()
                .name("idx_exec_records_workflow_id")
                .if_not_exists()
                .table(CollectionIden::Table)
                .col(CollectionIden::WorkflowId)
                .build(PostgresQueryBuilder),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl RecordCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }
}
