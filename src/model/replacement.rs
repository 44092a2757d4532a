//! Element replacement
//!
//! Replacing an element puts a new element in its tree position and moves
//! every reference that named the old element over to the new one. The
//! steps run in a fixed order:
//!
//! 1. collect the reference slots that name the old element, before
//!    anything changes;
//! 2. unlink references to the old element's descendants, which leave
//!    the document with it, except those inside the new element;
//! 3. if the two elements have different ids, rewrite the collected
//!    slots to the new id (keeping any prefix);
//! 4. swap the elements in the tree and update the identity index;
//! 5. refill stored mirror collections of the new element.
//!
//! The old element stays alive but detached, so replacing it a second
//! time is a no-op.

use std::sync::Arc;

use log::debug;

use crate::error::{Result, StructureError};
use crate::instance::{ModelElement, ModelInstance};

impl ModelInstance {
    /// Replace `old` with `new` in the tree and rewire references to it
    ///
    /// Nothing happens if `old` is not attached or is `new` itself.
    pub fn replace_element(
        &mut self,
        old: impl Into<ModelElement>,
        new: impl Into<ModelElement>,
    ) -> Result<()> {
        let old = old.into();
        let new = new.into();
        if old == new || !self.contains(old) || !self.is_attached(old) {
            debug!(old = old.node().to_string(); "Replacement skipped");
            return Ok(());
        }
        if self.document().is_ancestor_or_self(new.node(), old.node()) {
            return Err(StructureError::new("cannot replace an element with its own ancestor").into());
        }
        if let Some(parent) = self.parent_element(old)? {
            self.check_replacement_permitted(parent, new)?;
        }

        let model = Arc::clone(self.model_arc());
        let old_id = self.id_of(old)?;
        let new_id = self.id_of(new)?;

        let incoming = match old_id.as_deref() {
            Some(id) => self.collect_incoming_slots(old.node(), id)?,
            None => Vec::new(),
        };

        let mut unlinked = 0;
        for node in self.document().descendants(old.node())?.into_iter().skip(1) {
            // the new element may sit inside the old one and stays in the tree
            if !self.contains(ModelElement::from_node(node))
                || self.document().is_ancestor_or_self(new.node(), node)
            {
                continue;
            }
            if let Some(id) = self.id_of(ModelElement::from_node(node))? {
                unlinked += self.unlink_incoming_references(node, &id)?;
            }
        }

        let mut rewired = 0;
        if let (Some(old_id), Some(new_id)) = (old_id.as_deref(), new_id.as_deref()) {
            if old_id != new_id {
                for (reference, source, slots) in &incoming {
                    if !self.contains(ModelElement::from_node(*source)) {
                        continue;
                    }
                    self.rewrite_slots(model.reference(*reference), *source, slots, new_id)?;
                    rewired += slots.len();
                }
            }
        }

        self.replace_node(old.node(), new.node())?;
        let mirrored = self.refill_mirrors(new)?;

        debug!(
            old = old.node().to_string(),
            new = new.node().to_string(),
            unlinked = unlinked,
            rewired = rewired,
            mirrored = mirrored;
            "Element replaced"
        );
        Ok(())
    }

    fn check_replacement_permitted(&self, parent: ModelElement, new: ModelElement) -> Result<()> {
        let model = self.model();
        let parent_type = self.element_type(parent)?.id();
        let new_type = self.element_type(new)?.id();
        if parent_type == model.unknown_type()
            || new_type == model.unknown_type()
            || super::children::sequence_position(model, parent_type, new_type).is_some()
        {
            return Ok(());
        }
        Err(StructureError::new("replacement is not permitted in the parent element")
            .with_attempted(model.element_type(new_type).type_name())
            .with_permitted(
                model
                    .resolve_effective(parent_type)
                    .children
                    .iter()
                    .map(|id| model.child(*id).target_name().to_string()),
            )
            .into())
    }

    /// Add every source whose forward reference resolves to `element` to its mirror
    fn refill_mirrors(&mut self, element: ModelElement) -> Result<usize> {
        let model = Arc::clone(self.model_arc());
        let ty = self.element_type(element)?.id();
        let mut added = 0;
        for mirror in model.mirrors_for(ty) {
            let collection = mirror.collection();
            for source in mirror.source().find_sources(self, element)? {
                if self.id_of(source)?.is_none() {
                    continue;
                }
                if collection.add(self, element, source)? {
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}
