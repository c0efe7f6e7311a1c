//! Account signup: personal data, address, credentials, then role-specific steps

use crate::wizard::{
    Applicability, CrossFieldRule, FieldRequirement, FieldRule, FlowMode, PatternKind,
    StepDefinition, WizardError, WizardFlow,
};

use super::{ROLE_FIELD, ROLE_MANAGER, ROLE_MUSICIAN};

pub const STEP_PERSONAL: u32 = 1;
pub const STEP_ADDRESS: u32 = 2;
pub const STEP_CREDENTIALS: u32 = 3;
pub const STEP_INSTRUMENTS: u32 = 4;
pub const STEP_BAND: u32 = 5;

pub fn steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(STEP_PERSONAL, "Dados Pessoais")
            .field(FieldRequirement::required("nome", "Nome").rule(FieldRule::MinLength(2)))
            .field(
                FieldRequirement::required("email", "E-mail")
                    .rule(FieldRule::Pattern(PatternKind::Email)),
            )
            .field(
                FieldRequirement::required("telefone", "Telefone")
                    .rule(FieldRule::Pattern(PatternKind::Phone)),
            )
            .field(
                FieldRequirement::required("cpf", "CPF").rule(FieldRule::Pattern(PatternKind::TaxId)),
            ),
        StepDefinition::new(STEP_ADDRESS, "Endereço")
            .field(
                FieldRequirement::required("endereco.cep", "CEP")
                    .rule(FieldRule::Pattern(PatternKind::PostalCode)),
            )
            .field(FieldRequirement::required("endereco.logradouro", "Logradouro"))
            .field(FieldRequirement::required("endereco.numero", "Número"))
            .field(FieldRequirement::optional("endereco.complemento", "Complemento"))
            .field(FieldRequirement::required("endereco.cidade", "Cidade"))
            .field(
                FieldRequirement::required("endereco.estado", "Estado")
                    .rule(FieldRule::MinLength(2)),
            ),
        StepDefinition::new(STEP_CREDENTIALS, "Credenciais")
            .field(FieldRequirement::required("senha", "Senha").rule(FieldRule::MinLength(8)))
            .field(FieldRequirement::required("confirmarSenha", "Confirmação de senha"))
            .field(FieldRequirement::required(ROLE_FIELD, "Tipo de usuário"))
            .cross_rule(CrossFieldRule::matches(
                "senha",
                "confirmarSenha",
                "Passwords do not match",
            ))
            .cross_rule(CrossFieldRule::any_selected(
                ROLE_FIELD,
                "Select at least one account type",
            )),
        StepDefinition::new(STEP_INSTRUMENTS, "Instrumentos")
            .when(Applicability::selection_contains(ROLE_FIELD, ROLE_MUSICIAN))
            .field(
                FieldRequirement::required("instrumentos", "Instrumentos")
                    .rule(FieldRule::MinItems(1)),
            )
            .field(FieldRequirement::optional("nivelExperiencia", "Nível de experiência")),
        StepDefinition::new(STEP_BAND, "Dados da Banda")
            .when(Applicability::selection_contains(ROLE_FIELD, ROLE_MANAGER))
            .field(FieldRequirement::required("banda.nome", "Nome da banda"))
            .field(FieldRequirement::required("banda.generoMusical", "Gênero musical")),
    ]
}

pub fn flow() -> Result<WizardFlow, WizardError> {
    WizardFlow::new("signup", "user", FlowMode::Create, steps())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldValue, FieldValues};
    use crate::wizard::{resolve_steps, validate_step};

    fn with_roles(roles: &[&str]) -> FieldValues {
        FieldValues::new().with(ROLE_FIELD, FieldValue::selection(roles.iter().copied()))
    }

    #[test]
    fn test_step_set_by_role() {
        let defs = steps();
        assert_eq!(resolve_steps(&with_roles(&[]), &defs).ids(), vec![1, 2, 3]);
        assert_eq!(
            resolve_steps(&with_roles(&[ROLE_MUSICIAN]), &defs).labels(),
            vec!["Dados Pessoais", "Endereço", "Credenciais", "Instrumentos"]
        );
        assert_eq!(
            resolve_steps(&with_roles(&[ROLE_MANAGER, ROLE_MUSICIAN]), &defs).ids(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_credentials_require_a_role() {
        let values = with_roles(&[])
            .with("senha", FieldValue::text("segredo123"))
            .with("confirmarSenha", FieldValue::text("segredo123"));
        let result = validate_step(STEP_CREDENTIALS, &values, &steps());
        assert!(!result.is_valid);
        assert!(result.field_errors.contains_key(ROLE_FIELD));
    }

    #[test]
    fn test_flow_is_valid() {
        let flow = flow().unwrap();
        assert_eq!(flow.entity_key(), "user:new");
    }
}
