//! Band registration and editing share one set of steps

use crate::wizard::{
    Applicability, FieldRequirement, FieldRule, FlowMode, PatternKind, StepDefinition,
    WizardError, WizardFlow,
};

pub const STEP_BASICS: u32 = 1;
pub const STEP_CONTACT: u32 = 2;
pub const STEP_MEMBERS: u32 = 3;
pub const STEP_BOOKING: u32 = 4;
pub const STEP_MEDIA: u32 = 5;

/// Boolean that enables the booking step
pub const BOOKING_FLAG: &str = "aceitaContratacao";

pub fn steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(STEP_BASICS, "Informações Básicas")
            .field(FieldRequirement::required("nome", "Nome da banda"))
            .field(FieldRequirement::required("generoMusical", "Gênero musical"))
            .field(
                FieldRequirement::required("anoFormacao", "Ano de formação").rule(
                    FieldRule::Range {
                        min: 1900.0,
                        max: 2100.0,
                    },
                ),
            )
            .field(
                FieldRequirement::optional("descricao", "Descrição").rule(FieldRule::MinLength(10)),
            ),
        StepDefinition::new(STEP_CONTACT, "Contato")
            .field(
                FieldRequirement::required("contato.email", "E-mail")
                    .rule(FieldRule::Pattern(PatternKind::Email)),
            )
            .field(
                FieldRequirement::required("contato.telefone", "Telefone")
                    .rule(FieldRule::Pattern(PatternKind::Phone)),
            ),
        StepDefinition::new(STEP_MEMBERS, "Integrantes").field(
            FieldRequirement::required("integrantes", "Integrantes").rule(FieldRule::MinItems(1)),
        ),
        StepDefinition::new(STEP_BOOKING, "Contratação")
            .when(Applicability::FlagSet(BOOKING_FLAG.to_string()))
            .field(
                FieldRequirement::required("cacheMinimo", "Cachê mínimo").rule(FieldRule::Range {
                    min: 0.0,
                    max: 1_000_000.0,
                }),
            ),
        StepDefinition::new(STEP_MEDIA, "Mídia")
            .field(FieldRequirement::optional("logo", "Logo"))
            .field(FieldRequirement::optional("site", "Site").rule(FieldRule::MinLength(4))),
    ]
}

pub fn new_band() -> Result<WizardFlow, WizardError> {
    WizardFlow::new("new-band", "band", FlowMode::Create, steps())
}

pub fn edit_band(id: impl Into<String>) -> Result<WizardFlow, WizardError> {
    WizardFlow::new(
        "edit-band",
        "band",
        FlowMode::Edit { id: id.into() },
        steps(),
    )
}
