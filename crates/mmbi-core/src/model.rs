//! The concrete entities of the money-market BI service.
//!
//! Wire names are camelCase; relations travel as `{"id": n}` references.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use uuid::Uuid;

use crate::entity::{
  Entity, EntityId, EntityKind, EntityRef, FieldDef, FieldType, FieldValue,
  RelationDef, dedup_refs, many_ids, one_id,
};

// ─── Placeholder ─────────────────────────────────────────────────────────────

/// A free-form tag that other records can be attached to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placeholder {
  pub id:                     Option<EntityId>,
  pub description:            Option<String>,
  pub token:                  Option<String>,
  pub containing_placeholder: Option<EntityRef>,
}

impl Entity for Placeholder {
  const KIND: EntityKind = EntityKind::Placeholder;
  const FIELDS: &'static [FieldDef] = &[
    FieldDef::required("description", FieldType::Text),
    FieldDef::optional("token", FieldType::Text),
  ];
  const RELATIONS: &'static [RelationDef] = &[RelationDef::to_one(
    "containingPlaceholder",
    "containingPlaceholderId",
    EntityKind::Placeholder,
    false,
  )];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "description" => self.description.as_ref().into(),
      "token" => self.token.as_ref().into(),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "containingPlaceholder" => one_id(&self.containing_placeholder),
      _ => Vec::new(),
    }
  }
}

// ─── Dealer ──────────────────────────────────────────────────────────────────

/// A counterparty; application users belong to dealers as their
/// organisation and department.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dealer {
  pub id:             Option<EntityId>,
  pub dealer_name:    Option<String>,
  pub tax_number:     Option<String>,
  pub dealer_address: Option<String>,
  #[serde(default)]
  pub placeholders:   Vec<EntityRef>,
}

impl Entity for Dealer {
  const KIND: EntityKind = EntityKind::Dealer;
  const FIELDS: &'static [FieldDef] = &[
    FieldDef::required("dealerName", FieldType::Text),
    FieldDef::optional("taxNumber", FieldType::Text),
    FieldDef::optional("dealerAddress", FieldType::Text),
  ];
  const RELATIONS: &'static [RelationDef] = &[RelationDef::to_many(
    "placeholders",
    "placeholderId",
    EntityKind::Placeholder,
  )];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "dealerName" => self.dealer_name.as_ref().into(),
      "taxNumber" => self.tax_number.as_ref().into(),
      "dealerAddress" => self.dealer_address.as_ref().into(),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "placeholders" => many_ids(&self.placeholders),
      _ => Vec::new(),
    }
  }

  fn normalize(&mut self) { dedup_refs(&mut self.placeholders); }
}

// ─── SecurityClearance ───────────────────────────────────────────────────────

/// A clearance level; a clearance may grant other (lower) clearances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityClearance {
  pub id:                 Option<EntityId>,
  pub clearance_level:    Option<String>,
  #[serde(default)]
  pub granted_clearances: Vec<EntityRef>,
  #[serde(default)]
  pub placeholders:       Vec<EntityRef>,
}

impl Entity for SecurityClearance {
  const KIND: EntityKind = EntityKind::SecurityClearance;
  const FIELDS: &'static [FieldDef] =
    &[FieldDef::required("clearanceLevel", FieldType::Text)];
  const RELATIONS: &'static [RelationDef] = &[
    RelationDef::to_many(
      "grantedClearances",
      "grantedClearancesId",
      EntityKind::SecurityClearance,
    ),
    RelationDef::to_many("placeholders", "placeholderId", EntityKind::Placeholder),
  ];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "clearanceLevel" => self.clearance_level.as_ref().into(),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "grantedClearances" => many_ids(&self.granted_clearances),
      "placeholders" => many_ids(&self.placeholders),
      _ => Vec::new(),
    }
  }

  fn normalize(&mut self) {
    dedup_refs(&mut self.granted_clearances);
    dedup_refs(&mut self.placeholders);
  }
}

// ─── ApplicationUser ─────────────────────────────────────────────────────────

/// A user of the BI application, bound to an organisation, a department and
/// a security clearance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUser {
  pub id:                   Option<EntityId>,
  pub designation:          Option<Uuid>,
  pub application_identity: Option<String>,
  pub organization:         Option<EntityRef>,
  pub department:           Option<EntityRef>,
  pub security_clearance:   Option<EntityRef>,
  pub dealer_identity:      Option<EntityRef>,
  #[serde(default)]
  pub placeholders:         Vec<EntityRef>,
}

impl Entity for ApplicationUser {
  const KIND: EntityKind = EntityKind::ApplicationUser;
  const FIELDS: &'static [FieldDef] = &[
    FieldDef::required("designation", FieldType::Uuid),
    FieldDef::required("applicationIdentity", FieldType::Text),
  ];
  const RELATIONS: &'static [RelationDef] = &[
    RelationDef::to_one("organization", "organizationId", EntityKind::Dealer, true),
    RelationDef::to_one("department", "departmentId", EntityKind::Dealer, true),
    RelationDef::to_one(
      "securityClearance",
      "securityClearanceId",
      EntityKind::SecurityClearance,
      true,
    ),
    RelationDef::to_one(
      "dealerIdentity",
      "dealerIdentityId",
      EntityKind::Dealer,
      false,
    ),
    RelationDef::to_many("placeholders", "placeholderId", EntityKind::Placeholder),
  ];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "designation" => self.designation.into(),
      "applicationIdentity" => self.application_identity.as_ref().into(),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "organization" => one_id(&self.organization),
      "department" => one_id(&self.department),
      "securityClearance" => one_id(&self.security_clearance),
      "dealerIdentity" => one_id(&self.dealer_identity),
      "placeholders" => many_ids(&self.placeholders),
      _ => Vec::new(),
    }
  }

  fn normalize(&mut self) { dedup_refs(&mut self.placeholders); }
}

// ─── FiscalYear ──────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FiscalYearStatus {
  Open,
  Closed,
  InProgress,
}

impl FiscalYearStatus {
  pub const VARIANTS: &'static [&'static str] = &["OPEN", "CLOSED", "IN_PROGRESS"];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalYear {
  pub id:                 Option<EntityId>,
  pub fiscal_year_code:   Option<String>,
  pub start_date:         Option<NaiveDate>,
  pub end_date:           Option<NaiveDate>,
  pub fiscal_year_status: Option<FiscalYearStatus>,
  #[serde(default)]
  pub placeholders:       Vec<EntityRef>,
  pub created_by:         Option<EntityRef>,
  pub last_updated_by:    Option<EntityRef>,
}

impl Entity for FiscalYear {
  const KIND: EntityKind = EntityKind::FiscalYear;
  const FIELDS: &'static [FieldDef] = &[
    FieldDef::required("fiscalYearCode", FieldType::Text),
    FieldDef::required("startDate", FieldType::Date),
    FieldDef::required("endDate", FieldType::Date),
    FieldDef::optional(
      "fiscalYearStatus",
      FieldType::Enum(FiscalYearStatus::VARIANTS),
    ),
  ];
  const RELATIONS: &'static [RelationDef] = &[
    RelationDef::to_many("placeholders", "placeholderId", EntityKind::Placeholder),
    RelationDef::to_one(
      "createdBy",
      "createdById",
      EntityKind::ApplicationUser,
      false,
    ),
    RelationDef::to_one(
      "lastUpdatedBy",
      "lastUpdatedById",
      EntityKind::ApplicationUser,
      false,
    ),
  ];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "fiscalYearCode" => self.fiscal_year_code.as_ref().into(),
      "startDate" => self.start_date.into(),
      "endDate" => self.end_date.into(),
      "fiscalYearStatus" => self
        .fiscal_year_status
        .map_or(FieldValue::Null, |s| {
          FieldValue::Enum(<&'static str>::from(s).to_owned())
        }),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "placeholders" => many_ids(&self.placeholders),
      "createdBy" => one_id(&self.created_by),
      "lastUpdatedBy" => one_id(&self.last_updated_by),
      _ => Vec::new(),
    }
  }

  fn normalize(&mut self) { dedup_refs(&mut self.placeholders); }
}

// ─── FiscalQuarter ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalQuarter {
  pub id:                  Option<EntityId>,
  pub quarter_number:      Option<i64>,
  pub start_date:          Option<NaiveDate>,
  pub end_date:            Option<NaiveDate>,
  pub fiscal_quarter_code: Option<String>,
  pub fiscal_year:         Option<EntityRef>,
  #[serde(default)]
  pub placeholders:        Vec<EntityRef>,
}

impl Entity for FiscalQuarter {
  const KIND: EntityKind = EntityKind::FiscalQuarter;
  const FIELDS: &'static [FieldDef] = &[
    FieldDef::required("quarterNumber", FieldType::Integer),
    FieldDef::required("startDate", FieldType::Date),
    FieldDef::required("endDate", FieldType::Date),
    FieldDef::required("fiscalQuarterCode", FieldType::Text),
  ];
  const RELATIONS: &'static [RelationDef] = &[
    RelationDef::to_one("fiscalYear", "fiscalYearId", EntityKind::FiscalYear, true),
    RelationDef::to_many("placeholders", "placeholderId", EntityKind::Placeholder),
  ];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "quarterNumber" => self.quarter_number.into(),
      "startDate" => self.start_date.into(),
      "endDate" => self.end_date.into(),
      "fiscalQuarterCode" => self.fiscal_quarter_code.as_ref().into(),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "fiscalYear" => one_id(&self.fiscal_year),
      "placeholders" => many_ids(&self.placeholders),
      _ => Vec::new(),
    }
  }

  fn normalize(&mut self) { dedup_refs(&mut self.placeholders); }
}

// ─── FiscalMonth ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalMonth {
  pub id:                Option<EntityId>,
  pub month_number:      Option<i64>,
  pub start_date:        Option<NaiveDate>,
  pub end_date:          Option<NaiveDate>,
  pub fiscal_month_code: Option<String>,
  pub fiscal_year:       Option<EntityRef>,
  pub fiscal_quarter:    Option<EntityRef>,
  #[serde(default)]
  pub placeholders:      Vec<EntityRef>,
}

impl Entity for FiscalMonth {
  const KIND: EntityKind = EntityKind::FiscalMonth;
  const FIELDS: &'static [FieldDef] = &[
    FieldDef::required("monthNumber", FieldType::Integer),
    FieldDef::required("startDate", FieldType::Date),
    FieldDef::required("endDate", FieldType::Date),
    FieldDef::required("fiscalMonthCode", FieldType::Text),
  ];
  const RELATIONS: &'static [RelationDef] = &[
    RelationDef::to_one("fiscalYear", "fiscalYearId", EntityKind::FiscalYear, true),
    RelationDef::to_one(
      "fiscalQuarter",
      "fiscalQuarterId",
      EntityKind::FiscalQuarter,
      false,
    ),
    RelationDef::to_many("placeholders", "placeholderId", EntityKind::Placeholder),
  ];

  fn id(&self) -> Option<EntityId> { self.id }

  fn set_id(&mut self, id: Option<EntityId>) { self.id = id; }

  fn field(&self, name: &str) -> FieldValue {
    match name {
      "monthNumber" => self.month_number.into(),
      "startDate" => self.start_date.into(),
      "endDate" => self.end_date.into(),
      "fiscalMonthCode" => self.fiscal_month_code.as_ref().into(),
      _ => FieldValue::Null,
    }
  }

  fn related(&self, relation: &str) -> Vec<EntityId> {
    match relation {
      "fiscalYear" => one_id(&self.fiscal_year),
      "fiscalQuarter" => one_id(&self.fiscal_quarter),
      "placeholders" => many_ids(&self.placeholders),
      _ => Vec::new(),
    }
  }

  fn normalize(&mut self) { dedup_refs(&mut self.placeholders); }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::Error;

  #[test]
  fn placeholder_requires_description() {
    let p = Placeholder { token: Some("AAAAAAAAAA".into()), ..Default::default() };
    match p.validate() {
      Err(Error::Validation { kind, field }) => {
        assert_eq!(kind, EntityKind::Placeholder);
        assert_eq!(field, "description");
      }
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn application_user_requires_relations() {
    let user = ApplicationUser::from_body(json!({
      "designation": "6f1c7a4e-8d6c-4a55-9a34-1df4a8d2c0aa",
      "applicationIdentity": "AAAAAAAAAA",
      "organization": { "id": 1 },
      "department": { "id": 2 },
    }))
    .unwrap();
    match user.validate() {
      Err(Error::Validation { field, .. }) => assert_eq!(field, "securityClearance"),
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn fiscal_year_body_roundtrips_camel_case() {
    let year = FiscalYear::from_body(json!({
      "fiscalYearCode": "FY2024",
      "startDate": "2024-01-01",
      "endDate": "2024-12-31",
      "fiscalYearStatus": "IN_PROGRESS",
      "placeholders": [{ "id": 4 }, { "id": 3 }, { "id": 4 }],
    }))
    .unwrap();

    assert!(year.validate().is_ok());
    assert_eq!(year.fiscal_year_status, Some(FiscalYearStatus::InProgress));
    assert_eq!(
      year.field("fiscalYearStatus"),
      FieldValue::Enum("IN_PROGRESS".into())
    );
    // Duplicate references collapse.
    assert_eq!(year.related("placeholders"), vec![3, 4]);

    let doc = year.to_document().unwrap();
    assert_eq!(doc["fiscalYearCode"], "FY2024");
    assert_eq!(doc["startDate"], "2024-01-01");
  }

  #[test]
  fn malformed_body_is_rejected() {
    let err = FiscalYear::from_body(json!({ "startDate": "yesterday" }))
      .unwrap_err();
    assert!(matches!(err, Error::MalformedBody { kind: EntityKind::FiscalYear, .. }));
  }

  #[test]
  fn merge_patch_only_touches_supplied_fields() {
    let original = Placeholder {
      id:                     Some(7),
      description:            Some("AAAAAAAAAA".into()),
      token:                  Some("AAAAAAAAAA".into()),
      containing_placeholder: None,
    };

    let patched = original
      .merge_patch(&json!({ "id": 99, "token": "BBBBBBBBBB", "description": null }))
      .unwrap();

    assert_eq!(patched.id, Some(7));
    assert_eq!(patched.description.as_deref(), Some("AAAAAAAAAA"));
    assert_eq!(patched.token.as_deref(), Some("BBBBBBBBBB"));
  }

  #[test]
  fn links_enumerate_every_relation() {
    let user = ApplicationUser {
      organization: Some(EntityRef::new(1)),
      department: Some(EntityRef::new(1)),
      security_clearance: Some(EntityRef::new(2)),
      placeholders: vec![EntityRef::new(5), EntityRef::new(6)],
      ..Default::default()
    };
    let links = user.links();
    assert_eq!(links.len(), 5);
    assert!(links.iter().any(|l| l.relation == "securityClearance"
      && l.target == EntityKind::SecurityClearance
      && l.id == 2));
  }
}
