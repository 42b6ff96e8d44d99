use crate::descriptor::{internal_name, plain_signature};
use crate::error::{Error, Result};
use crate::ir::{Annotation, ClassRecord, FieldRecord, MethodRecord};

/// Anything that carries annotations.
pub trait Annotated {
    fn annotations(&self) -> &[Annotation];
}

impl Annotated for ClassRecord {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl Annotated for MethodRecord {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl Annotated for FieldRecord {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// First annotation of the given type, visible or not.
///
/// `annotation` may be a descriptor (`Lorg/demo/Hook;`), an internal name
/// or a dotted name.
pub fn find_annotation<'a, T>(target: &'a T, annotation: &str) -> Option<&'a Annotation>
where
    T: Annotated + ?Sized,
{
    let descriptor = if annotation.starts_with('L') && annotation.ends_with(';') {
        annotation.to_string()
    } else {
        format!("L{};", internal_name(annotation))
    };
    target
        .annotations()
        .iter()
        .find(|candidate| candidate.descriptor == descriptor)
}

pub fn has_annotation<T>(target: &T, annotation: &str) -> bool
where
    T: Annotated + ?Sized,
{
    find_annotation(target, annotation).is_some()
}

/// Look up a helper method that injected code will call statically.
pub fn require_static_helper<'a>(
    class: &'a ClassRecord,
    name: &str,
    descriptor: &str,
) -> Result<&'a MethodRecord> {
    let signature = plain_signature(name, descriptor)?;
    let Some(method) = class.method(name, descriptor) else {
        return Err(Error::MissingHelper {
            class: class.name.clone(),
            message: format!("{} is missing helper method {signature}", class.name),
        });
    };
    if !method.is_static() {
        return Err(Error::MissingHelper {
            class: class.name.clone(),
            message: format!("helper method {signature} in {} must be static", class.name),
        });
    }
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::AccessFlags;

    fn hooks() -> ClassRecord {
        let mut class = ClassRecord::new("net/demo/Hooks", Some("java/lang/Object"));
        class
            .annotations
            .push(Annotation::new("Lnet/demo/Generated;", false));
        let mut tick = MethodRecord::new(AccessFlags::PUBLIC | AccessFlags::STATIC, "onTick", "(J)Z");
        tick.annotations
            .push(Annotation::new("Ljava/lang/Deprecated;", true));
        class.methods.push(tick);
        class
            .methods
            .push(MethodRecord::new(AccessFlags::PUBLIC, "onDraw", "(F)V"));
        class
    }

    #[test]
    fn annotations_match_any_name_form() {
        let class = hooks();
        let tick = class.method("onTick", "(J)Z").expect("method");

        assert!(has_annotation(&class, "net/demo/Generated"));
        assert!(has_annotation(&class, "net.demo.Generated"));
        assert!(has_annotation(tick, "Ljava/lang/Deprecated;"));
        assert!(!has_annotation(tick, "net/demo/Generated"));
        assert_eq!(
            find_annotation(&class, "net/demo/Generated").map(|found| found.visible),
            Some(false)
        );
    }

    #[test]
    fn static_helper_is_returned() {
        let class = hooks();

        let helper = require_static_helper(&class, "onTick", "(J)Z").expect("helper");

        assert_eq!(helper.name, "onTick");
    }

    #[test]
    fn missing_and_instance_helpers_are_distinguished() {
        let class = hooks();

        let missing = require_static_helper(&class, "onLoad", "(I)V").expect_err("missing");
        let instance = require_static_helper(&class, "onDraw", "(F)V").expect_err("not static");

        assert_eq!(
            missing.to_string(),
            "net/demo/Hooks is missing helper method void onLoad(int)"
        );
        assert_eq!(
            instance.to_string(),
            "helper method void onDraw(float) in net/demo/Hooks must be static"
        );
    }
}
