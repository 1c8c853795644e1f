//! Fluent entity query builder.
//!
//! A [`Builder`] is created per logical query with [`Session::sql`], shaped with
//! chained calls and finished with exactly one terminal call:
//!
//! ```ignore
//! // Read
//! let orders = session
//!     .sql(Invoice::default())
//!     .filter(eq("status", "open").and().gt("amount", 100))
//!     .order_by("amount", Order::Desc)
//!     .limit(20)
//!     .find()
//!     .await?;
//!
//! // Multi-entity transaction
//! let tx = session.sql(invoice).insert_tx().await?;
//! session.sql(invoice_line).set_tx(tx, true).insert().await?;
//! ```
//!
//! Shaping calls only record scopes; nothing touches the store until the
//! terminal call. Reads use the attached transaction when there is one and
//! the shared store otherwise. Writes inside a transaction follow the
//! rollback/commit rules described in [`crate::transaction`].

use crate::clause::Clause;
use crate::client::Store;
use crate::error::{OrmError, OrmResult};
use crate::join::{self, JoinInstruction};
use crate::row::{Entity, Record};
use crate::scope::{self, Order, ScopeList, Statement};
use crate::session::Session;
use crate::sql::Fragment;
use crate::transaction::{Transaction, TxState, next_savepoint_name};
use crate::value::{FromValue, Value};
use heck::ToUpperCamelCase;


/// Table identifier and current predicate of a builder, used to declare joins.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSql {
    pub table: String,
    pub predicate: Option<Fragment>,
}

/// Query and CRUD builder for one entity type.
pub struct Builder<S: Store, E: Entity> {
    session: Session<S>,
    entity: E,
    clause: Option<Clause>,
    scopes: ScopeList,
    has_many: bool,
    shaped: bool,
    tx: TxState<S::Tx>,
}

impl<S: Store, E: Entity> Builder<S, E> {
    pub(crate) fn new(session: Session<S>, entity: E) -> Self {
        Self {
            session,
            entity,
            clause: None,
            scopes: ScopeList::new(),
            has_many: false,
            shaped: false,
            tx: TxState::default(),
        }
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    fn shape<F>(mut self, scope: F) -> Self
    where
        F: Fn(&mut Statement) + Send + Sync + 'static,
    {
        self.shaped = true;
        self.scopes.push(scope);
        self
    }

    // ==================== Shaping ====================

    pub fn select<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.shape(move |s| {
            s.select(columns.iter().cloned());
        })
    }

    /// Add a WHERE condition. The clause is rendered now; later filters are ANDed.
    pub fn filter(mut self, clause: Clause) -> Self {
        let cond = Fragment::from(&clause);
        self.clause = Some(clause);
        self.shape(move |s| {
            s.filter(cond.clone());
        })
    }

    pub fn having(mut self, clause: Clause) -> Self {
        let cond = Fragment::from(&clause);
        self.clause = Some(clause);
        self.shape(move |s| {
            s.having(cond.clone());
        })
    }

    pub fn order_by(self, column: impl Into<String>, order: Order) -> Self {
        let column = column.into();
        self.shape(move |s| {
            s.order_by(column.clone(), order);
        })
    }

    pub fn group_by(self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.shape(move |s| {
            s.group_by(column.clone());
        })
    }

    pub fn limit(self, limit: u64) -> Self {
        self.shape(move |s| {
            s.limit(limit);
        })
    }

    pub fn offset(self, offset: u64) -> Self {
        self.shape(move |s| {
            s.offset(offset);
        })
    }

    /// Join `table` on a shorthand condition with bare column names.
    ///
    /// An empty clause turns the call into [`preload`](Self::preload).
    pub fn join_on(self, table: impl Into<String>, clause: Clause) -> Self {
        let table = table.into();
        let cond = Fragment::from(&clause);
        self.join_instruction(join::resolve(&table, Some(cond)))
    }

    /// Join the table another builder targets, on that builder's predicate.
    pub fn join<S2: Store, F: Entity>(self, other: &Builder<S2, F>) -> Self {
        let TableSql { table, predicate } = other.to_sql();
        self.join_instruction(join::resolve(&table, predicate))
    }

    /// Load a named relation with a follow-up query after the main read.
    pub fn preload(self, relation: impl Into<String>) -> Self {
        self.join_instruction(JoinInstruction::Preload(relation.into()))
    }

    fn join_instruction(self, instruction: JoinInstruction) -> Self {
        match instruction {
            JoinInstruction::Preload(relation) => self.shape(move |s| {
                s.preload(relation.clone());
            }),
            JoinInstruction::Inner { table, on } => {
                let join = render_join::<E>(&table, on);
                self.shape(move |s| {
                    s.join(join.clone());
                })
            }
        }
    }

    /// Target the collection: `to_sql` reports the table name instead of the type name.
    pub fn is_many(mut self) -> Self {
        self.has_many = true;
        self
    }

    // ==================== Transactions ====================

    /// Attach a transaction begun elsewhere.
    ///
    /// With `commit` set, the transaction is committed after the next
    /// successful write.
    ///
    /// # Panics
    ///
    /// If any shaping call came first, or a transaction is already attached.
    pub fn set_tx(mut self, tx: Transaction<S::Tx>, commit: bool) -> Self {
        assert!(
            !self.shaped,
            "Builder::set_tx must be called before any shaping call on {}",
            E::NAME
        );
        assert!(
            self.tx.handle.is_none(),
            "Builder::set_tx called on a {} builder that already holds a transaction",
            E::NAME
        );
        self.tx.handle = Some(tx);
        self.tx.commit = commit;
        self
    }

    /// Begin a transaction for this builder.
    pub async fn begin(mut self) -> OrmResult<Self> {
        if self.tx.handle.is_some() {
            return Err(OrmError::transaction(format!(
                "{} builder already holds a transaction",
                E::NAME
            )));
        }
        self.tx.handle = Some(self.session.begin().await?);
        Ok(self)
    }

    /// Scope the next write to a savepoint: a failure rolls back to it and
    /// leaves the transaction open.
    pub fn savepoint(mut self, name: impl Into<String>) -> Self {
        self.tx.savepoint = Some(name.into());
        self
    }

    /// [`savepoint`](Self::savepoint) with a generated name.
    pub fn nested(self) -> Self {
        self.savepoint(next_savepoint_name())
    }

    /// Commit after the next successful write.
    pub fn commit_on_success(mut self) -> Self {
        self.tx.commit = true;
        self
    }

    /// The attached transaction, if any.
    pub fn transaction(&self) -> Option<&Transaction<S::Tx>> {
        self.tx.handle.as_ref()
    }

    // ==================== Introspection ====================

    /// Table identifier and current predicate.
    ///
    /// The identifier is the type name, or the collection name in
    /// UpperCamelCase after [`is_many`](Self::is_many).
    pub fn to_sql(&self) -> TableSql {
        let table = if self.has_many {
            E::TABLE.to_upper_camel_case()
        } else {
            E::NAME.to_string()
        };
        TableSql {
            table,
            predicate: self
                .clause
                .as_ref()
                .filter(|c| !c.is_empty())
                .map(Fragment::from),
        }
    }

    /// Render the SELECT the current scopes produce.
    pub fn to_select(&self) -> Fragment {
        self.statement().to_select()
    }

    fn statement(&self) -> Statement {
        self.scopes.build(E::TABLE)
    }

    // ==================== Reads ====================

    /// Fetch every matching row.
    pub async fn find(self) -> OrmResult<Vec<E>> {
        let stmt = self.statement();
        let records = self.fetch(&stmt.to_select()).await?;
        let mut entities = decode_all::<E>(&records)?;
        self.preload_into(&stmt, &records, &mut entities).await?;
        Ok(entities)
    }

    /// Fetch the first matching row, ordered by primary key unless an order was given.
    pub async fn one(self) -> OrmResult<E> {
        let mut stmt = self.statement();
        if !stmt.has_order() {
            stmt.order_by(format!("{}.{}", E::TABLE, E::PRIMARY_KEY), Order::Asc);
        }
        stmt.limit(1);

        let records = self.fetch(&stmt.to_select()).await?;
        let records = &records[..records.len().min(1)];
        let mut entities = decode_all::<E>(records)?;
        self.preload_into(&stmt, records, &mut entities).await?;
        entities
            .pop()
            .ok_or_else(|| OrmError::not_found(format!("{} not found", E::NAME)))
    }

    pub async fn count(self) -> OrmResult<i64> {
        let records = self.fetch(&self.statement().to_count()).await?;
        let value = records
            .first()
            .and_then(|r| r.iter().next())
            .map(|(_, v)| v)
            .ok_or_else(|| OrmError::decode("count", "no row returned"))?;
        i64::from_value(value)
    }

    /// Run raw SQL and decode the first row. Shaping scopes do not apply.
    pub async fn query(self, sql: &str, args: Vec<Value>) -> OrmResult<E> {
        let records = self.fetch(&Fragment::new(sql, args)).await?;
        match records.first() {
            Some(record) => E::from_record(record),
            None => Err(OrmError::not_found(format!("{} not found", E::NAME))),
        }
    }

    /// Run raw SQL and decode every row. Shaping scopes do not apply.
    pub async fn query_rows(self, sql: &str, args: Vec<Value>) -> OrmResult<Vec<E>> {
        let records = self.fetch(&Fragment::new(sql, args)).await?;
        decode_all::<E>(&records)
    }

    async fn fetch(&self, stmt: &Fragment) -> OrmResult<Vec<Record>> {
        match &self.tx.handle {
            Some(handle) => {
                let slot = handle.lock().await;
                let tx = slot.active()?;
                self.session.fetch(tx, stmt).await
            }
            None => self.session.fetch(self.session.store(), stmt).await,
        }
    }

    async fn preload_into(
        &self,
        stmt: &Statement,
        records: &[Record],
        entities: &mut [E],
    ) -> OrmResult<()> {
        for name in stmt.preloads() {
            let relation = E::relation(name).ok_or_else(|| {
                OrmError::validation(format!("{} has no relation named '{name}'", E::NAME))
            })?;

            let keys: Vec<Value> = records
                .iter()
                .filter_map(|r| r.get(relation.local_key))
                .filter(|v| !v.is_null())
                .cloned()
                .collect();
            if keys.is_empty() {
                continue;
            }

            let children = self
                .fetch(&Fragment::new(
                    format!(
                        "SELECT * FROM {} WHERE {} IN ?",
                        relation.table, relation.foreign_key
                    ),
                    vec![Value::List(keys)],
                ))
                .await?;

            for (entity, record) in entities.iter_mut().zip(records) {
                let key = record.get(relation.local_key);
                let rows = children
                    .iter()
                    .filter(|child| key.is_some() && child.get(relation.foreign_key) == key)
                    .cloned()
                    .collect();
                entity.attach(name, rows)?;
            }
        }
        Ok(())
    }

    // ==================== Writes ====================

    pub async fn insert(self) -> OrmResult<()> {
        let stmt = self.insert_statement()?;
        self.tx.write(&self.session, &stmt).await.map(|_| ())
    }

    /// Insert every entity in one statement. An empty batch does nothing.
    pub async fn insert_batch(self, entities: Vec<E>) -> OrmResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let records: Vec<Record> = entities.iter().map(Entity::to_record).collect();
        let stmt = scope::insert(E::TABLE, E::PRIMARY_KEY, &records)?;
        self.tx.write(&self.session, &stmt).await.map(|_| ())
    }

    /// Update matching rows, or the entity's own row when no filter was given.
    ///
    /// Without `select`, `NULL` fields are left untouched; with it, exactly
    /// the selected columns are written.
    pub async fn update(self) -> OrmResult<u64> {
        let stmt = self.update_statement()?;
        self.tx.write(&self.session, &stmt).await
    }

    /// Delete matching rows, or the entity's own row when no filter was given.
    pub async fn delete(self) -> OrmResult<u64> {
        let stmt = self.delete_statement()?;
        self.tx.write(&self.session, &stmt).await
    }

    /// Run a raw statement. Inside a transaction it is treated as a write.
    pub async fn exec(self, sql: &str, args: Vec<Value>) -> OrmResult<u64> {
        self.tx.write(&self.session, &Fragment::new(sql, args)).await
    }

    /// [`insert`](Self::insert) inside a transaction, begun if none is attached.
    pub async fn insert_tx(self) -> OrmResult<Transaction<S::Tx>> {
        let stmt = self.insert_statement()?;
        self.write_tx(stmt).await
    }

    /// [`update`](Self::update) inside a transaction, begun if none is attached.
    pub async fn update_tx(self) -> OrmResult<Transaction<S::Tx>> {
        let stmt = self.update_statement()?;
        self.write_tx(stmt).await
    }

    /// [`delete`](Self::delete) inside a transaction, begun if none is attached.
    pub async fn delete_tx(self) -> OrmResult<Transaction<S::Tx>> {
        let stmt = self.delete_statement()?;
        self.write_tx(stmt).await
    }

    async fn write_tx(mut self, stmt: Fragment) -> OrmResult<Transaction<S::Tx>> {
        let handle = match &self.tx.handle {
            Some(handle) => handle.clone(),
            None => {
                let handle = self.session.begin().await?;
                self.tx.handle = Some(handle.clone());
                handle
            }
        };
        self.tx.write(&self.session, &stmt).await?;
        Ok(handle)
    }

    fn insert_statement(&self) -> OrmResult<Fragment> {
        scope::insert(E::TABLE, E::PRIMARY_KEY, &[self.entity.to_record()])
    }

    fn update_statement(&self) -> OrmResult<Fragment> {
        let mut stmt = self.statement();
        let mut values = self.entity.to_record();
        let pk = values.remove(E::PRIMARY_KEY).unwrap_or_default();

        let selected = stmt.selected();
        let set: Record = if selected.is_empty() {
            values.into_iter().filter(|(_, v)| !v.is_null()).collect()
        } else {
            values
                .into_iter()
                .filter(|(c, _)| selected.iter().any(|s| s == c))
                .collect()
        };

        target_own_row::<E>(&mut stmt, pk, "UPDATE")?;
        stmt.to_update(&set)
    }

    fn delete_statement(&self) -> OrmResult<Fragment> {
        let mut stmt = self.statement();
        let pk = self
            .entity
            .to_record()
            .get(E::PRIMARY_KEY)
            .cloned()
            .unwrap_or_default();
        target_own_row::<E>(&mut stmt, pk, "DELETE")?;
        Ok(stmt.to_delete())
    }
}

/// Without a WHERE scope, restrict the statement to the entity's primary key.
fn target_own_row<E: Entity>(stmt: &mut Statement, pk: Value, action: &str) -> OrmResult<()> {
    if stmt.has_where() {
        return Ok(());
    }
    if pk.is_null() {
        return Err(OrmError::validation(format!(
            "{action} {} needs a filter or a primary key value",
            E::TABLE
        )));
    }
    stmt.filter(Fragment::new(format!("{} = ?", E::PRIMARY_KEY), vec![pk]));
    Ok(())
}

fn render_join<E: Entity>(name: &str, on: Fragment) -> Fragment {
    match E::relation(name) {
        Some(rel) => Fragment::new(
            format!(
                "INNER JOIN {} AS {name} ON {name}.{} = {}.{} AND ({})",
                rel.table,
                rel.foreign_key,
                E::TABLE,
                rel.local_key,
                on.sql
            ),
            on.args,
        ),
        None => Fragment::new(format!("INNER JOIN {name} ON {}", on.sql), on.args),
    }
}

fn decode_all<E: Entity>(records: &[Record]) -> OrmResult<Vec<E>> {
    records.iter().map(E::from_record).collect()
}
