//! Schema history of the events/billing/room-reservation database.
//!
//! Every `down` goes through the `*_created` removals of [`SchemaEditor`], so
//! reverting a migration only removes what that migration added. A table,
//! column or index that was already there when `up` ran survives the revert.

use std::sync::LazyLock;

use chrono::NaiveDate;
use cipt_common::Result;
use regex::Regex;
use rusqlite::types::Value;
use tracing::info;

use crate::migration::Migration;
use crate::schema::{
    ColumnDef, ColumnType, DefaultValue, IndexDef, Outcome, SchemaEditor, TableDef,
};
use crate::statement::{DataUpdate, Predicate};

/// Every migration, in any order; the runner sorts by id.
pub fn all() -> Vec<Migration> {
    vec![
        Migration::new(
            "20250801000000-create-base-schema",
            create_base_schema,
            drop_base_schema,
        ),
        Migration::new("20250811000000-create-dars", create_dars, drop_dars),
        Migration::new(
            "20250811000100-create-dars-eventos",
            create_dars_eventos,
            drop_dars_eventos,
        ),
        Migration::new(
            "20250811120000-add-tipo-desconto-to-eventos",
            add_tipo_desconto,
            remove_tipo_desconto,
        ),
        Migration::new(
            "20250812103000-add-desconto-manual-to-eventos",
            add_desconto_manual,
            remove_desconto_manual,
        ),
        Migration::new(
            "20250813120000-add-numero-proc-termo-to-eventos",
            ensure_numero_proc_termo,
            remove_numero_proc_termo,
        ),
        Migration::new(
            "20250813180000-add-espaco-area-to-eventos",
            add_espaco_area,
            remove_espaco_area,
        ),
        Migration::new(
            "20250813190000-add-numero-oficio-sei-to-eventos",
            add_numero_oficio_sei,
            remove_numero_oficio_sei,
        ),
        Migration::new("20250815100000-add-horas-to-eventos", add_horas, remove_horas),
        Migration::new(
            "20250815120000-add-data-vigencia-final-to-eventos",
            add_data_vigencia_final,
            remove_data_vigencia_final,
        ),
        Migration::new(
            "20250815130000-ensure-numero-proc-termo-eventos",
            ensure_numero_proc_termo,
            remove_numero_proc_termo,
        ),
        Migration::new(
            "20250815140000-add-evento-gratuito-to-eventos",
            add_evento_gratuito,
            remove_evento_gratuito,
        ),
        Migration::irreversible("20250816000000-unify-vencida-status", unify_vencida_status),
        Migration::new(
            "20250817100000-add-data-emissao-to-dars",
            add_data_emissao,
            remove_data_emissao,
        ),
        Migration::new(
            "20250818120000-add-emitido-por-id-to-dars",
            add_emitido_por_id,
            remove_emitido_por_id,
        ),
        Migration::new(
            "20250819150000-create-salas-reservas",
            create_salas_reservas,
            drop_salas_reservas,
        ),
        Migration::new("20250819150001-seed-salas", seed_salas, unseed_salas),
        Migration::new(
            "20250828140702-add-unique-reservas",
            add_unique_reservas,
            remove_unique_reservas,
        ),
        Migration::new(
            "20250901220500-add-dars-linha-digitavel",
            add_linha_digitavel,
            remove_linha_digitavel,
        ),
        Migration::new(
            "20250901224000-add-dars-data-pagamento",
            add_dars_data_pagamento,
            remove_dars_data_pagamento,
        ),
        Migration::new(
            "20250906120000-create-reservas-audit",
            create_reservas_audit,
            drop_reservas_audit,
        ),
        Migration::new(
            "20250907130000-add-remarcacao-fields-to-eventos",
            add_remarcacao_fields,
            remove_remarcacao_fields,
        ),
        Migration::new(
            "20250907140000-add-remarcacao-solicitada-to-eventos",
            add_remarcacao_solicitada,
            remove_remarcacao_solicitada,
        ),
        Migration::new(
            "20250907150000-ensure-eventos-columns",
            ensure_eventos_columns,
            remove_ensured_eventos_columns,
        ),
        Migration::new(
            "20250907151000-add-address-fields-to-clientes-eventos",
            add_address_fields,
            remove_address_fields,
        ),
        Migration::new(
            "20250907152000-add-justificativa-remarcacao-to-eventos",
            add_justificativa_remarcacao,
            remove_justificativa_remarcacao,
        ),
        Migration::new(
            "20250907153000-create-advertencias",
            create_advertencias,
            drop_advertencias,
        ),
        Migration::new(
            "20250907154000-add-inapto-status-to-clientes-eventos",
            add_inapto_status,
            remove_inapto_status,
        ),
        Migration::new(
            "20250909170000-add-tipo-to-permissionarios",
            add_tipo_permissionario,
            remove_tipo_permissionario,
        ),
        Migration::new(
            "20250910120000-add-emprestimos-to-eventos",
            add_emprestimos,
            remove_emprestimos,
        ),
        Migration::new(
            "20250911130000-ensure-valor-aluguel-permissionarios",
            ensure_valor_aluguel_permissionarios,
            remove_valor_aluguel_permissionarios,
        ),
        Migration::new(
            "20250911190000-add-valor-aluguel-clientes-eventos",
            add_valor_aluguel_clientes,
            remove_valor_aluguel_clientes,
        ),
        Migration::new(
            "20250912100000-add-token-definir-senha-expires",
            add_token_definir_senha_expires,
            remove_token_definir_senha_expires,
        ),
        Migration::new(
            "20250912110000-add-dars-comprovante-token",
            add_comprovante_token,
            remove_comprovante_token,
        ),
        Migration::new(
            "20250912120000-add-unique-index-eventos-numero-termo",
            add_unique_numero_termo,
            remove_unique_numero_termo,
        ),
        Migration::new("20250915120000-create-clientes", create_clientes, drop_clientes),
        Migration::irreversible(
            "20250920120000-backfill-data-vigencia-final",
            backfill_data_vigencia_final,
        ),
        Migration::new(
            "20250923130000-create-documentos-historico",
            create_documentos_historico,
            drop_documentos_historico,
        ),
        Migration::new("20250927100000-add-sem-juros-to-dars", add_sem_juros, remove_sem_juros),
        Migration::new(
            "20250930123000-create-dar-conciliacoes",
            create_dar_conciliacoes,
            drop_dar_conciliacoes,
        ),
        Migration::new(
            "20250930123500-create-dar-conciliacoes-pagamentos",
            create_dar_conciliacoes_pagamentos,
            drop_dar_conciliacoes_pagamentos,
        ),
        Migration::new(
            "20250930140000-create-dar-baixa-solicitacoes",
            create_dar_baixa_solicitacoes,
            drop_dar_baixa_solicitacoes,
        ),
        Migration::new(
            "20250930150010-create-espacos-evento",
            create_espacos_evento,
            drop_espacos_evento,
        ),
    ]
}

fn add_columns(ed: &SchemaEditor<'_>, table: &str, columns: &[ColumnDef]) -> Result<()> {
    for column in columns {
        ed.add_column(table, column)?;
    }
    Ok(())
}

/// Reverse of [`add_columns`]: last added goes first.
fn remove_created_columns(ed: &SchemaEditor<'_>, table: &str, names: &[&str]) -> Result<()> {
    for name in names.iter().rev() {
        ed.remove_created_column(table, name)?;
    }
    Ok(())
}

fn text(name: &str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Text)
}

fn flag(name: &str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Integer)
        .not_null()
        .default(DefaultValue::Integer(0))
}

fn create_base_schema(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "permissionarios",
        vec![
            ColumnDef::id(),
            ColumnDef::new("nome_empresa", ColumnType::Text).not_null(),
            ColumnDef::new("cnpj", ColumnType::Text).not_null().unique(),
            ColumnDef::new("email", ColumnType::Text).not_null(),
            ColumnDef::new("telefone", ColumnType::Text),
            ColumnDef::new("valor_aluguel", ColumnType::Real).not_null(),
            ColumnDef::new("senha", ColumnType::Text),
        ],
    ))?;
    ed.create_table(&TableDef::new(
        "Clientes_Eventos",
        vec![
            ColumnDef::id(),
            ColumnDef::new("nome_razao_social", ColumnType::String).not_null(),
            ColumnDef::new("documento", ColumnType::String),
            ColumnDef::new("email", ColumnType::String),
            ColumnDef::new("telefone", ColumnType::String),
        ],
    ))?;
    ed.create_table(&TableDef::new(
        "Eventos",
        vec![
            ColumnDef::id(),
            ColumnDef::new("id_cliente", ColumnType::Integer).references(
                "Clientes_Eventos",
                "id",
                Some("SET NULL"),
            ),
            ColumnDef::new("nome_evento", ColumnType::String).not_null(),
            ColumnDef::new("datas_evento", ColumnType::Text),
            ColumnDef::new("valor_bruto", ColumnType::Real),
            ColumnDef::new("valor_final", ColumnType::Real)
                .not_null()
                .default(DefaultValue::Integer(0)),
            ColumnDef::new("status", ColumnType::String),
        ],
    ))?;
    Ok(())
}

fn drop_base_schema(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("Eventos")?;
    ed.drop_created_table("Clientes_Eventos")?;
    ed.drop_created_table("permissionarios")?;
    Ok(())
}

fn create_dars(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(
        &TableDef::new(
            "dars",
            vec![
                ColumnDef::id(),
                ColumnDef::new("permissionario_id", ColumnType::Integer).references(
                    "permissionarios",
                    "id",
                    None,
                ),
                ColumnDef::new("mes_referencia", ColumnType::Integer),
                ColumnDef::new("ano_referencia", ColumnType::Integer),
                ColumnDef::new("valor", ColumnType::Float).not_null(),
                ColumnDef::new("data_vencimento", ColumnType::String).not_null(),
                ColumnDef::new("status", ColumnType::String).not_null(),
                ColumnDef::new("descricao", ColumnType::Text),
                ColumnDef::new("codigo_receita", ColumnType::String),
                ColumnDef::new("numero_documento", ColumnType::String),
                ColumnDef::new("data_emissao", ColumnType::Text)
                    .default(DefaultValue::CurrentTimestamp),
                ColumnDef::new("codigo_barras", ColumnType::String),
                ColumnDef::new("linha_digitavel", ColumnType::String),
                ColumnDef::new("link_pdf", ColumnType::String),
            ],
        )
        .unique_key(&["permissionario_id", "mes_referencia", "ano_referencia"]),
    )?;
    Ok(())
}

fn drop_dars(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("dars")?;
    Ok(())
}

fn create_dars_eventos(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "DARs_Eventos",
        vec![
            ColumnDef::id(),
            ColumnDef::new("id_dar", ColumnType::Integer)
                .not_null()
                .references("dars", "id", Some("CASCADE")),
            ColumnDef::new("id_evento", ColumnType::Integer)
                .not_null()
                .references("Eventos", "id", Some("CASCADE")),
            ColumnDef::new("numero_parcela", ColumnType::Integer).not_null(),
            ColumnDef::new("valor_parcela", ColumnType::Real).not_null(),
            ColumnDef::new("data_vencimento", ColumnType::Text),
        ],
    ))?;
    Ok(())
}

fn drop_dars_eventos(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("DARs_Eventos")?;
    Ok(())
}

fn add_tipo_desconto(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("Eventos", &ColumnDef::new("tipo_desconto", ColumnType::String))?;
    Ok(())
}

fn remove_tipo_desconto(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Eventos", "tipo_desconto")?;
    Ok(())
}

fn add_desconto_manual(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column(
        "Eventos",
        &ColumnDef::new(
            "desconto_manual",
            ColumnType::Decimal {
                precision: 10,
                scale: 2,
            },
        ),
    )?;
    Ok(())
}

fn remove_desconto_manual(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Eventos", "desconto_manual")?;
    Ok(())
}

/// Shared by the original add and the later ensure; whichever runs first owns
/// the columns.
fn ensure_numero_proc_termo(ed: &SchemaEditor<'_>) -> Result<()> {
    add_columns(
        ed,
        "Eventos",
        &[
            ColumnDef::new("numero_processo", ColumnType::String),
            ColumnDef::new("numero_termo", ColumnType::String),
        ],
    )
}

fn remove_numero_proc_termo(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Eventos", &["numero_processo", "numero_termo"])
}

fn add_espaco_area(ed: &SchemaEditor<'_>) -> Result<()> {
    add_columns(
        ed,
        "Eventos",
        &[
            ColumnDef::new("espaco_utilizado", ColumnType::String),
            ColumnDef::new("area_m2", ColumnType::Float),
        ],
    )
}

fn remove_espaco_area(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Eventos", &["espaco_utilizado", "area_m2"])
}

fn add_numero_oficio_sei(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("Eventos", &ColumnDef::new("numero_oficio_sei", ColumnType::String))?;
    Ok(())
}

fn remove_numero_oficio_sei(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Eventos", "numero_oficio_sei")?;
    Ok(())
}

const HORAS: [&str; 4] = ["hora_inicio", "hora_fim", "hora_montagem", "hora_desmontagem"];

fn add_horas(ed: &SchemaEditor<'_>) -> Result<()> {
    let columns: Vec<ColumnDef> = HORAS
        .iter()
        .map(|name| ColumnDef::new(*name, ColumnType::String))
        .collect();
    add_columns(ed, "Eventos", &columns)
}

fn remove_horas(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Eventos", &HORAS)
}

fn add_data_vigencia_final(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("Eventos", &ColumnDef::new("data_vigencia_final", ColumnType::Date))?;
    Ok(())
}

fn remove_data_vigencia_final(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Eventos", "data_vigencia_final")?;
    Ok(())
}

fn add_evento_gratuito(ed: &SchemaEditor<'_>) -> Result<()> {
    add_columns(
        ed,
        "Eventos",
        &[flag("evento_gratuito"), text("justificativa_gratuito")],
    )
}

fn remove_evento_gratuito(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Eventos", &["evento_gratuito", "justificativa_gratuito"])
}

/// "Vencida" and "Vencido" were both used for overdue DARs. Not reversible:
/// afterwards there is no telling which rows were originally "Vencida".
fn unify_vencida_status(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.run_update(
        &DataUpdate::new("dars")
            .set("status", "Vencido".to_string())
            .filter(Predicate::eq("status", "Vencida".to_string())),
    )?;
    Ok(())
}

/// `ADD COLUMN` cannot take a `CURRENT_TIMESTAMP` default, so a `dars` table
/// that predates the column gets it nullable and without a default.
fn add_data_emissao(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("dars", &ColumnDef::new("data_emissao", ColumnType::Date))?;
    Ok(())
}

fn remove_data_emissao(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("dars", "data_emissao")?;
    Ok(())
}

/// Plain integer: SQLite cannot `DROP COLUMN` a column carrying a foreign key,
/// which would leave this migration without an inverse.
fn add_emitido_por_id(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("dars", &ColumnDef::new("emitido_por_id", ColumnType::Integer))?;
    Ok(())
}

fn remove_emitido_por_id(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("dars", "emitido_por_id")?;
    Ok(())
}

fn create_salas_reservas(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "salas_reuniao",
        vec![
            ColumnDef::id(),
            ColumnDef::new("numero", ColumnType::String).not_null(),
            ColumnDef::new("capacidade", ColumnType::Integer).not_null(),
            ColumnDef::new("status", ColumnType::String)
                .not_null()
                .default(DefaultValue::Text("disponivel".into())),
        ],
    ))?;
    ed.create_table(&TableDef::new(
        "reservas_salas",
        vec![
            ColumnDef::id(),
            ColumnDef::new("sala_id", ColumnType::Integer)
                .not_null()
                .references("salas_reuniao", "id", Some("CASCADE")),
            ColumnDef::new("permissionario_id", ColumnType::Integer)
                .not_null()
                .references("permissionarios", "id", Some("CASCADE")),
            ColumnDef::new("data", ColumnType::String).not_null(),
            ColumnDef::new("hora_inicio", ColumnType::String).not_null(),
            ColumnDef::new("hora_fim", ColumnType::String).not_null(),
            ColumnDef::new("participantes", ColumnType::Integer),
            ColumnDef::new("status", ColumnType::String),
            ColumnDef::new("checkin", ColumnType::String),
        ],
    ))?;
    Ok(())
}

fn drop_salas_reservas(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("reservas_salas")?;
    ed.drop_created_table("salas_reuniao")?;
    Ok(())
}

/// Meeting rooms available from day one: (numero, capacidade).
pub const SEED_SALAS: [(&str, i64); 6] = [
    ("116", 15),
    ("114", 8),
    ("214", 15),
    ("204", 8),
    ("314", 15),
    ("304", 8),
];

fn seed_salas(ed: &SchemaEditor<'_>) -> Result<()> {
    let rows: Vec<Vec<(&str, Value)>> = SEED_SALAS
        .iter()
        .map(|(numero, capacidade)| {
            vec![
                ("numero", Value::Text(numero.to_string())),
                ("capacidade", Value::Integer(*capacidade)),
                ("status", Value::Text("disponivel".into())),
            ]
        })
        .collect();
    ed.seed_rows("salas_reuniao", "numero", &rows)?;
    Ok(())
}

fn unseed_salas(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_seeded_rows("salas_reuniao", "numero")?;
    Ok(())
}

/// A room cannot be booked twice for the same slot.
pub const RESERVAS_UNIQUE_INDEX: &str = "reservas_salas_unica";

fn add_unique_reservas(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_index(
        "reservas_salas",
        &IndexDef::new(
            RESERVAS_UNIQUE_INDEX,
            &["sala_id", "data", "hora_inicio", "hora_fim"],
        )
        .unique(),
    )
}

fn remove_unique_reservas(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_index("reservas_salas", RESERVAS_UNIQUE_INDEX)?;
    Ok(())
}

/// A freshly added `linha_digitavel` starts as a copy of `codigo_barras`.
fn add_linha_digitavel(ed: &SchemaEditor<'_>) -> Result<()> {
    let added = ed.add_column("dars", &ColumnDef::new("linha_digitavel", ColumnType::String))?;
    if added == Outcome::Applied && ed.has_column("dars", "codigo_barras")? {
        ed.run_update(
            &DataUpdate::new("dars")
                .set_from("linha_digitavel", "codigo_barras")
                .filter(
                    Predicate::is_null("linha_digitavel")
                        .and(Predicate::is_not_null("codigo_barras")),
                ),
        )?;
    }
    Ok(())
}

fn remove_linha_digitavel(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("dars", "linha_digitavel")?;
    Ok(())
}

fn add_dars_data_pagamento(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("dars", &ColumnDef::new("data_pagamento", ColumnType::Date))?;
    ed.add_index_if_missing(
        "dars",
        &IndexDef::new("idx_dars_data_pagamento", &["data_pagamento"]),
    )?;
    Ok(())
}

fn remove_dars_data_pagamento(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_index("dars", "idx_dars_data_pagamento")?;
    ed.remove_created_column("dars", "data_pagamento")?;
    Ok(())
}

fn create_reservas_audit(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "reservas_audit",
        vec![
            ColumnDef::id(),
            ColumnDef::new("reserva_id", ColumnType::Integer)
                .not_null()
                .references("reservas_salas", "id", Some("CASCADE")),
            ColumnDef::new("acao", ColumnType::String).not_null(),
            text("detalhes"),
            ColumnDef::new("data_registro", ColumnType::Date)
                .not_null()
                .default(DefaultValue::CurrentTimestamp),
        ],
    ))?;
    Ok(())
}

fn drop_reservas_audit(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("reservas_audit")?;
    Ok(())
}

fn add_remarcacao_fields(ed: &SchemaEditor<'_>) -> Result<()> {
    add_columns(
        ed,
        "Eventos",
        &[
            flag("remarcado"),
            text("datas_evento_original"),
            text("data_pedido_remarcacao"),
        ],
    )
}

fn remove_remarcacao_fields(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(
        ed,
        "Eventos",
        &["remarcado", "datas_evento_original", "data_pedido_remarcacao"],
    )
}

fn add_remarcacao_solicitada(ed: &SchemaEditor<'_>) -> Result<()> {
    add_columns(
        ed,
        "Eventos",
        &[
            flag("remarcacao_solicitada"),
            text("datas_evento_solicitada"),
            text("data_aprovacao_remarcacao"),
        ],
    )
}

fn remove_remarcacao_solicitada(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(
        ed,
        "Eventos",
        &[
            "remarcacao_solicitada",
            "datas_evento_solicitada",
            "data_aprovacao_remarcacao",
        ],
    )
}

const ENSURED_EVENTOS_COLUMNS: [&str; 7] = [
    "data_vigencia_final",
    "remarcado",
    "datas_evento_original",
    "data_pedido_remarcacao",
    "remarcacao_solicitada",
    "datas_evento_solicitada",
    "data_aprovacao_remarcacao",
];

/// Catch-up for databases that skipped the rescheduling migrations.
fn ensure_eventos_columns(ed: &SchemaEditor<'_>) -> Result<()> {
    let columns: Vec<ColumnDef> = ENSURED_EVENTOS_COLUMNS
        .iter()
        .map(|name| match *name {
            "remarcado" | "remarcacao_solicitada" => flag(name),
            _ => text(name),
        })
        .collect();
    add_columns(ed, "Eventos", &columns)
}

fn remove_ensured_eventos_columns(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Eventos", &ENSURED_EVENTOS_COLUMNS)
}

const ADDRESS_FIELDS: [&str; 8] = [
    "cep",
    "logradouro",
    "numero",
    "complemento",
    "bairro",
    "cidade",
    "uf",
    "endereco",
];

fn add_address_fields(ed: &SchemaEditor<'_>) -> Result<()> {
    let columns: Vec<ColumnDef> = ADDRESS_FIELDS.iter().map(|name| text(name)).collect();
    add_columns(ed, "Clientes_Eventos", &columns)
}

fn remove_address_fields(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Clientes_Eventos", &ADDRESS_FIELDS)
}

fn add_justificativa_remarcacao(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("Eventos", &text("justificativa_remarcacao"))?;
    Ok(())
}

fn remove_justificativa_remarcacao(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Eventos", "justificativa_remarcacao")?;
    Ok(())
}

/// `cliente_id` points at `Clientes`, which is only created later on; SQLite
/// checks foreign keys on write, not when the table is declared.
fn create_advertencias(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "Advertencias",
        vec![
            ColumnDef::id(),
            ColumnDef::new("evento_id", ColumnType::Integer)
                .not_null()
                .references("Eventos", "id", Some("CASCADE")),
            ColumnDef::new("cliente_id", ColumnType::Integer)
                .not_null()
                .references("Clientes", "id", Some("CASCADE")),
            text("texto_fatos"),
            text("clausulas_json"),
            ColumnDef::new("gera_multa", ColumnType::Boolean),
            ColumnDef::new("valor_multa", ColumnType::Real),
            ColumnDef::new("inapto_ate", ColumnType::Date),
            ColumnDef::new("prazo_recurso_dias", ColumnType::Integer),
            ColumnDef::new("dar_id", ColumnType::Integer).references(
                "dars",
                "id",
                Some("SET NULL"),
            ),
            ColumnDef::new("token", ColumnType::String).unique(),
            text("pdf_url"),
            ColumnDef::new("status", ColumnType::String),
            ColumnDef::new("createdAt", ColumnType::Date)
                .not_null()
                .default(DefaultValue::CurrentTimestamp),
            ColumnDef::new("updatedAt", ColumnType::Date)
                .not_null()
                .default(DefaultValue::CurrentTimestamp),
        ],
    ))?;
    Ok(())
}

fn drop_advertencias(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("Advertencias")?;
    Ok(())
}

fn add_inapto_status(ed: &SchemaEditor<'_>) -> Result<()> {
    add_columns(
        ed,
        "Clientes_Eventos",
        &[
            ColumnDef::new("inapto_ate", ColumnType::Date),
            ColumnDef::new("status_cliente", ColumnType::String),
        ],
    )
}

fn remove_inapto_status(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Clientes_Eventos", &["inapto_ate", "status_cliente"])
}

fn add_tipo_permissionario(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("permissionarios", &ColumnDef::new("tipo", ColumnType::String))?;
    Ok(())
}

fn remove_tipo_permissionario(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("permissionarios", "tipo")?;
    Ok(())
}

const EMPRESTIMOS: [&str; 3] = [
    "emprestimo_tvs",
    "emprestimo_caixas_som",
    "emprestimo_microfones",
];

fn add_emprestimos(ed: &SchemaEditor<'_>) -> Result<()> {
    let columns: Vec<ColumnDef> = EMPRESTIMOS
        .iter()
        .map(|name| {
            ColumnDef::new(*name, ColumnType::Boolean)
                .not_null()
                .default(DefaultValue::Integer(0))
        })
        .collect();
    add_columns(ed, "Eventos", &columns)
}

fn remove_emprestimos(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(ed, "Eventos", &EMPRESTIMOS)
}

fn ensure_valor_aluguel_permissionarios(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column(
        "permissionarios",
        &ColumnDef::new("valor_aluguel", ColumnType::Float)
            .not_null()
            .default(DefaultValue::Integer(0)),
    )?;
    Ok(())
}

fn remove_valor_aluguel_permissionarios(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("permissionarios", "valor_aluguel")?;
    Ok(())
}

fn add_valor_aluguel_clientes(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column(
        "Clientes_Eventos",
        &ColumnDef::new("valor_aluguel", ColumnType::Real),
    )?;
    Ok(())
}

fn remove_valor_aluguel_clientes(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Clientes_Eventos", "valor_aluguel")?;
    Ok(())
}

fn add_token_definir_senha_expires(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column(
        "Clientes_Eventos",
        &ColumnDef::new("token_definir_senha_expires", ColumnType::Integer),
    )?;
    Ok(())
}

fn remove_token_definir_senha_expires(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("Clientes_Eventos", "token_definir_senha_expires")?;
    Ok(())
}

fn add_comprovante_token(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("dars", &text("comprovante_token"))?;
    Ok(())
}

fn remove_comprovante_token(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("dars", "comprovante_token")?;
    Ok(())
}

/// Duplicate `numero_termo` rows are deleted (lowest rowid wins) before the
/// unique index goes on. `down` only drops the index; deleted rows stay deleted.
fn add_unique_numero_termo(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.dedupe_keep_first("Eventos", &["numero_termo"])?;
    ed.add_index(
        "Eventos",
        &IndexDef::new("ux_eventos_numero_termo", &["numero_termo"]).unique(),
    )
}

fn remove_unique_numero_termo(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_index("Eventos", "ux_eventos_numero_termo")?;
    Ok(())
}

fn create_clientes(ed: &SchemaEditor<'_>) -> Result<()> {
    let mut columns = vec![ColumnDef::id()];
    columns.extend(
        [
            "nome_razao_social",
            "documento",
            "endereco",
            "cep",
            "email",
            "telefone",
            "logradouro",
            "numero",
            "complemento",
            "bairro",
            "cidade",
            "uf",
        ]
        .into_iter()
        .map(text),
    );
    ed.create_table(&TableDef::new("Clientes", columns))?;
    Ok(())
}

fn drop_clientes(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("Clientes")?;
    Ok(())
}

static DATE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\s]+").expect("separator pattern is valid"));

/// Latest date in a `datas_evento` value: a JSON array of ISO dates, or a
/// list split on commas, semicolons or whitespace. `None` if any entry does
/// not start with a `YYYY-MM-DD` date.
pub fn last_event_date(datas: &str) -> Option<NaiveDate> {
    let entries: Vec<String> = match serde_json::from_str::<serde_json::Value>(datas) {
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().unwrap_or_default().to_string())
            .collect(),
        Ok(_) => Vec::new(),
        Err(_) => DATE_SEPARATORS
            .split(datas)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    };
    let dates: Option<Vec<NaiveDate>> = entries
        .iter()
        .map(|entry| {
            let day = entry.get(..10)?;
            NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
        })
        .collect();
    dates?.into_iter().max()
}

/// Fill an empty `data_vigencia_final` with the day after the event's last
/// date. Irreversible: clearing the column afterwards would also wipe dates
/// entered by hand before this ran.
fn backfill_data_vigencia_final(ed: &SchemaEditor<'_>) -> Result<()> {
    if !ed.has_column("Eventos", "datas_evento")?
        || !ed.has_column("Eventos", "data_vigencia_final")?
    {
        info!("Eventos has no datas_evento/data_vigencia_final pair, nothing to backfill");
        return Ok(());
    }
    let empty = Predicate::Or(vec![
        Predicate::is_null("data_vigencia_final"),
        Predicate::eq("data_vigencia_final", String::new()),
    ]);

    let mut filled = 0;
    for row in ed.select("Eventos", &["id", "datas_evento"], &empty)? {
        let (Some(Value::Integer(id)), Some(Value::Text(datas))) = (row.first(), row.get(1))
        else {
            continue;
        };
        let Some(end) = last_event_date(datas).and_then(|d| d.succ_opt()) else {
            continue;
        };
        filled += ed.run_update(
            &DataUpdate::new("Eventos")
                .set("data_vigencia_final", end.format("%Y-%m-%d").to_string())
                .filter(Predicate::eq("id", *id)),
        )?;
    }
    info!("backfilled data_vigencia_final on {filled} event(s)");
    Ok(())
}

fn create_documentos_historico(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "documentos_historico",
        vec![
            ColumnDef::id(),
            ColumnDef::new("documento_id", ColumnType::Integer),
            text("token"),
            ColumnDef::new("evento_id", ColumnType::Integer),
            text("status"),
            text("created_at"),
        ],
    ))?;
    Ok(())
}

fn drop_documentos_historico(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("documentos_historico")?;
    Ok(())
}

fn add_sem_juros(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.add_column("dars", &flag("sem_juros"))?;
    Ok(())
}

fn remove_sem_juros(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_column("dars", "sem_juros")?;
    Ok(())
}

fn now_text(name: &str) -> ColumnDef {
    text(name).default(DefaultValue::Expression("datetime('now')"))
}

fn create_dar_conciliacoes(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "dar_conciliacoes",
        vec![
            ColumnDef::id(),
            text("data_execucao").not_null(),
            text("data_referencia").not_null(),
            text("iniciou_em"),
            text("finalizou_em"),
            ColumnDef::new("duracao_ms", ColumnType::Integer),
            ColumnDef::new("total_pagamentos", ColumnType::Integer)
                .default(DefaultValue::Integer(0)),
            ColumnDef::new("total_atualizados", ColumnType::Integer)
                .default(DefaultValue::Integer(0)),
            text("status")
                .not_null()
                .default(DefaultValue::Text("sucesso".into()))
                .check("status IN ('sucesso','falha')"),
            text("mensagem"),
        ],
    ))?;
    ed.add_index_if_missing(
        "dar_conciliacoes",
        &IndexDef::new("idx_dar_conciliacoes_data_ref", &["data_referencia"]),
    )?;
    ed.add_index_if_missing(
        "dar_conciliacoes",
        &IndexDef::new("idx_dar_conciliacoes_execucao", &["data_execucao"]).descending(),
    )?;
    Ok(())
}

fn drop_dar_conciliacoes(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_index("dar_conciliacoes", "idx_dar_conciliacoes_execucao")?;
    ed.remove_created_index("dar_conciliacoes", "idx_dar_conciliacoes_data_ref")?;
    ed.drop_created_table("dar_conciliacoes")?;
    Ok(())
}

fn create_dar_conciliacoes_pagamentos(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "dar_conciliacoes_pagamentos",
        vec![
            ColumnDef::id(),
            ColumnDef::new("conciliacao_id", ColumnType::Integer)
                .not_null()
                .references("dar_conciliacoes", "id", Some("CASCADE")),
            ColumnDef::new("dar_id", ColumnType::Integer),
            text("status_anterior"),
            text("status_atual"),
            text("numero_documento"),
            ColumnDef::new("valor", ColumnType::Real),
            text("data_vencimento"),
            text("data_pagamento"),
            text("origem"),
            text("contribuinte"),
            text("documento_contribuinte"),
            text("pagamento_guia"),
            text("pagamento_documento"),
            ColumnDef::new("pagamento_valor", ColumnType::Real),
            text("pagamento_data"),
            now_text("criado_em"),
        ],
    ))?;
    ed.add_index_if_missing(
        "dar_conciliacoes_pagamentos",
        &IndexDef::new("idx_dar_conc_pag_conciliacao", &["conciliacao_id"]),
    )?;
    ed.add_index_if_missing(
        "dar_conciliacoes_pagamentos",
        &IndexDef::new("idx_dar_conc_pag_dar", &["dar_id"]),
    )?;
    Ok(())
}

fn drop_dar_conciliacoes_pagamentos(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.remove_created_index("dar_conciliacoes_pagamentos", "idx_dar_conc_pag_dar")?;
    ed.remove_created_index("dar_conciliacoes_pagamentos", "idx_dar_conc_pag_conciliacao")?;
    ed.drop_created_table("dar_conciliacoes_pagamentos")?;
    Ok(())
}

fn create_dar_baixa_solicitacoes(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.create_table(&TableDef::new(
        "dar_baixa_solicitacoes",
        vec![
            ColumnDef::id(),
            ColumnDef::new("dar_id", ColumnType::Integer)
                .not_null()
                .references("dars", "id", Some("CASCADE")),
            ColumnDef::new("permissionario_id", ColumnType::Integer)
                .not_null()
                .references("permissionarios", "id", None),
            text("solicitado_por_tipo").not_null(),
            ColumnDef::new("solicitado_por_id", ColumnType::Integer),
            text("status")
                .not_null()
                .default(DefaultValue::Text("pendente".into())),
            text("data_pagamento"),
            text("guia_token"),
            text("comprovante_token"),
            ColumnDef::new("admin_id", ColumnType::Integer),
            text("admin_observacao"),
            text("resposta_em"),
            now_text("criado_em"),
            now_text("atualizado_em"),
        ],
    ))?;
    // Older copies of the table lack the review columns. `atualizado_em` goes
    // in without its default, which `ADD COLUMN` refuses.
    add_columns(
        ed,
        "dar_baixa_solicitacoes",
        &[
            text("admin_observacao"),
            text("resposta_em"),
            text("atualizado_em"),
        ],
    )
}

fn drop_dar_baixa_solicitacoes(ed: &SchemaEditor<'_>) -> Result<()> {
    remove_created_columns(
        ed,
        "dar_baixa_solicitacoes",
        &["admin_observacao", "resposta_em", "atualizado_em"],
    )?;
    ed.drop_created_table("dar_baixa_solicitacoes")?;
    Ok(())
}

fn create_espacos_evento(ed: &SchemaEditor<'_>) -> Result<()> {
    let money = |name: &str| {
        ColumnDef::new(name, ColumnType::Real)
            .not_null()
            .default(DefaultValue::Integer(0))
    };
    ed.create_table(&TableDef::new(
        "espacos_evento",
        vec![
            ColumnDef::id(),
            text("nome").not_null().unique(),
            text("slug").not_null().unique(),
            ColumnDef::new("capacidade", ColumnType::Integer)
                .not_null()
                .default(DefaultValue::Integer(0)),
            money("area_m2"),
            money("valor_diaria_1"),
            money("valor_diaria_2"),
            money("valor_diaria_3"),
            money("valor_diaria_adicional"),
            ColumnDef::new("ativo", ColumnType::Integer)
                .not_null()
                .default(DefaultValue::Integer(1)),
            now_text("criado_em"),
            now_text("atualizado_em"),
        ],
    ))?;
    Ok(())
}

fn drop_espacos_evento(ed: &SchemaEditor<'_>) -> Result<()> {
    ed.drop_created_table("espacos_evento")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MigrationRunner;

    #[test]
    fn catalogue_ids_are_valid_and_unique() {
        let runner = MigrationRunner::with_catalogue().unwrap();
        assert_eq!(runner.migrations().len(), all().len());
        let irreversible: Vec<&str> = runner
            .migrations()
            .iter()
            .filter(|m| !m.reversible)
            .map(|m| m.id)
            .collect();
        assert_eq!(
            irreversible,
            vec![
                "20250816000000-unify-vencida-status",
                "20250920120000-backfill-data-vigencia-final"
            ]
        );
    }

    #[test]
    fn last_event_date_reads_json_and_plain_lists() {
        let day = |d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap();
        assert_eq!(
            last_event_date(r#"["2025-09-12","2025-09-10T08:00:00"]"#),
            Some(day("2025-09-12"))
        );
        assert_eq!(last_event_date("2025-03-01, 2025-02-28;2025-03-02"), Some(day("2025-03-02")));
        assert_eq!(last_event_date("[]"), None);
        assert_eq!(last_event_date(r#"{"a":1}"#), None);
        assert_eq!(last_event_date("2025-03-01, amanha"), None);
    }
}
