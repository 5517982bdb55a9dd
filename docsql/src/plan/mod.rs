
use bson::{doc, Bson, Document};
use serde::Serialize;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize)]
pub enum StageKind {
    Match,
    Lookup,
    Unwind,
    Group,
    Project,
    AddFields,
    Sort,
    Skip,
    Limit,
}

impl StageKind {
    pub fn operator(self) -> &'static str {
        use StageKind::*;
        match self {
            Match => "$match",
            Lookup => "$lookup",
            Unwind => "$unwind",
            Group => "$group",
            Project => "$project",
            AddFields => "$addFields",
            Sort => "$sort",
            Skip => "$skip",
            Limit => "$limit",
        }
    }
}

/// One pipeline stage. The body is whatever follows the stage operator:
/// a document for most stages, an integer for `$skip` and `$limit`.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Stage {
    pub kind: StageKind,
    pub body: Bson,
}

impl Stage {
    pub fn to_document(&self) -> Document {
        doc! { self.kind.operator(): self.body.clone() }
    }
}

/// An ordered list of stages against one root collection.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct AggregationPlan {
    pub collection: String,
    pub stages: Vec<Stage>,
}

impl AggregationPlan {
    pub fn new(collection: impl Into<String>) -> Self {
        AggregationPlan {
            collection: collection.into(),
            stages: vec![],
        }
    }

    /// Appends a stage. Stages with an empty document body are dropped.
    pub fn add_stage(&mut self, kind: StageKind, body: impl Into<Bson>) {
        let body = body.into();
        if matches!(&body, Bson::Document(d) if d.is_empty()) {
            return;
        }
        self.stages.push(Stage { kind, body });
    }

    pub fn count(&self, kind: StageKind) -> usize {
        self.stages.iter().filter(|s| s.kind == kind).count()
    }

    pub fn pipeline(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}
